//! Validator catalog and the mode profiles that select from it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorCategory {
    Core,
    Entity,
    Relationship,
    Business,
    Accessibility,
    Fare,
    Meta,
}

impl ValidatorCategory {
    pub const ALL: &'static [ValidatorCategory] = &[
        ValidatorCategory::Core,
        ValidatorCategory::Entity,
        ValidatorCategory::Relationship,
        ValidatorCategory::Business,
        ValidatorCategory::Accessibility,
        ValidatorCategory::Fare,
        ValidatorCategory::Meta,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    Cheap,
    /// Whole-feed analyses: date ranges, geospatial clustering, network topology.
    Expensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Performance,
    #[default]
    Default,
    Comprehensive,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Performance => "performance",
            ValidationMode::Default => "default",
            ValidationMode::Comprehensive => "comprehensive",
        }
    }

    pub fn profile(&self) -> ModeProfile {
        ModeProfile::for_mode(*self)
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown validation mode `{0}` (expected performance, default or comprehensive)")]
pub struct ParseModeError(String);

impl FromStr for ValidationMode {
    type Err = ParseModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "performance" => Ok(ValidationMode::Performance),
            "default" => Ok(ValidationMode::Default),
            "comprehensive" => Ok(ValidationMode::Comprehensive),
            _ => Err(ParseModeError(value.to_string())),
        }
    }
}

/// What a mode runs and how many notices per code it keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeProfile {
    pub mode: ValidationMode,
    pub categories: &'static [ValidatorCategory],
    pub include_expensive: bool,
    pub max_notices_per_type: usize,
}

impl ModeProfile {
    pub fn for_mode(mode: ValidationMode) -> Self {
        match mode {
            ValidationMode::Performance => Self {
                mode,
                categories: &[
                    ValidatorCategory::Core,
                    ValidatorCategory::Entity,
                    ValidatorCategory::Relationship,
                ],
                include_expensive: false,
                max_notices_per_type: 100,
            },
            ValidationMode::Default => Self {
                mode,
                categories: ValidatorCategory::ALL,
                include_expensive: false,
                max_notices_per_type: 1_000,
            },
            ValidationMode::Comprehensive => Self {
                mode,
                categories: ValidatorCategory::ALL,
                include_expensive: true,
                max_notices_per_type: 10_000,
            },
        }
    }

    pub fn selects(&self, category: ValidatorCategory, cost: CostClass) -> bool {
        self.categories.contains(&category)
            && (self.include_expensive || cost == CostClass::Cheap)
    }
}

#[derive(Clone)]
pub struct RegisteredValidator {
    pub category: ValidatorCategory,
    pub cost: CostClass,
    pub validator: Arc<dyn Validator>,
}

impl RegisteredValidator {
    pub fn name(&self) -> &'static str {
        self.validator.name()
    }
}

impl fmt::Debug for RegisteredValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredValidator")
            .field("name", &self.name())
            .field("category", &self.category)
            .field("cost", &self.cost)
            .finish()
    }
}

/// Immutable set of validators tagged by category and cost.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    entries: Vec<RegisteredValidator>,
}

impl ValidatorRegistry {
    pub fn builder() -> ValidatorRegistryBuilder {
        ValidatorRegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RegisteredValidator] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredValidator> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    /// Validators the mode selects, in registration order.
    pub fn resolve(&self, mode: ValidationMode) -> ResolvedPlan {
        let profile = ModeProfile::for_mode(mode);
        let units = self
            .entries
            .iter()
            .filter(|entry| profile.selects(entry.category, entry.cost))
            .cloned()
            .collect();
        ResolvedPlan {
            mode,
            units,
            max_notices_per_type: profile.max_notices_per_type,
        }
    }
}

#[derive(Default)]
pub struct ValidatorRegistryBuilder {
    entries: Vec<RegisteredValidator>,
}

impl ValidatorRegistryBuilder {
    pub fn register<V>(mut self, category: ValidatorCategory, cost: CostClass, validator: V) -> Self
    where
        V: Validator + 'static,
    {
        self.entries.push(RegisteredValidator {
            category,
            cost,
            validator: Arc::new(validator),
        });
        self
    }

    pub fn build(self) -> ValidatorRegistry {
        ValidatorRegistry {
            entries: self.entries,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub mode: ValidationMode,
    pub units: Vec<RegisteredValidator>,
    pub max_notices_per_type: usize,
}

impl ResolvedPlan {
    pub fn unit_names(&self) -> Vec<&'static str> {
        self.units.iter().map(RegisteredValidator::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeedAccessor, NoticeStore, ValidationConfig};

    struct Named(&'static str);

    impl Validator for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn validate(&self, _: &dyn FeedAccessor, _: &NoticeStore, _: &ValidationConfig) {}
    }

    fn registry() -> ValidatorRegistry {
        ValidatorRegistry::builder()
            .register(ValidatorCategory::Core, CostClass::Cheap, Named("core_cheap"))
            .register(ValidatorCategory::Fare, CostClass::Cheap, Named("fare_cheap"))
            .register(
                ValidatorCategory::Relationship,
                CostClass::Expensive,
                Named("relationship_expensive"),
            )
            .register(
                ValidatorCategory::Business,
                CostClass::Expensive,
                Named("business_expensive"),
            )
            .build()
    }

    #[test]
    fn performance_runs_cheap_structural_units() {
        let plan = registry().resolve(ValidationMode::Performance);
        assert_eq!(plan.unit_names(), vec!["core_cheap"]);
        assert_eq!(plan.max_notices_per_type, 100);
    }

    #[test]
    fn default_runs_every_cheap_unit() {
        let plan = registry().resolve(ValidationMode::Default);
        assert_eq!(plan.unit_names(), vec!["core_cheap", "fare_cheap"]);
        assert_eq!(plan.max_notices_per_type, 1_000);
    }

    #[test]
    fn comprehensive_runs_everything() {
        let plan = registry().resolve(ValidationMode::Comprehensive);
        assert_eq!(plan.units.len(), 4);
        assert_eq!(plan.max_notices_per_type, 10_000);
    }

    #[test]
    fn parses_modes() {
        assert_eq!(
            " Comprehensive ".parse::<ValidationMode>().unwrap(),
            ValidationMode::Comprehensive
        );
        assert!("fast".parse::<ValidationMode>().is_err());
        assert_eq!(ValidationMode::default(), ValidationMode::Default);
    }
}
