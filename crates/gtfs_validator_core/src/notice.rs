use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoticeSeverity {
    Error,
    Warning,
    Info,
}

impl NoticeSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeSeverity::Error => "ERROR",
            NoticeSeverity::Warning => "WARNING",
            NoticeSeverity::Info => "INFO",
        }
    }
}

impl fmt::Display for NoticeSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notice code together with the severity every notice of that code carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeCode {
    name: &'static str,
    severity: NoticeSeverity,
}

impl NoticeCode {
    pub const fn error(name: &'static str) -> Self {
        Self {
            name,
            severity: NoticeSeverity::Error,
        }
    }

    pub const fn warning(name: &'static str) -> Self {
        Self {
            name,
            severity: NoticeSeverity::Warning,
        }
    }

    pub const fn info(name: &'static str) -> Self {
        Self {
            name,
            severity: NoticeSeverity::Info,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn severity(&self) -> NoticeSeverity {
        self.severity
    }
}

impl fmt::Display for NoticeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Emitted by the engine when a validator panics.
pub const VALIDATOR_ERROR: NoticeCode = NoticeCode::error("validator_error");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationNotice {
    code: String,
    severity: NoticeSeverity,
    message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, Value>,
}

impl ValidationNotice {
    pub fn new(code: NoticeCode, message: impl Into<String>) -> Self {
        Self {
            code: code.name().to_string(),
            severity: code.severity(),
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Notice for a validator that panicked instead of finishing.
    pub fn validator_error(validator: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        ValidationNotice::new(
            VALIDATOR_ERROR,
            format!("validator {validator} failed: {message}"),
        )
        .with_context_field("validator", validator)
        .with_context_field("exception", message)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn severity(&self) -> NoticeSeverity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn context_field(&self, name: &str) -> Option<&Value> {
        self.context.get(name)
    }

    pub fn filename(&self) -> Option<&str> {
        self.context.get("filename").and_then(Value::as_str)
    }

    pub fn row_number(&self) -> Option<u64> {
        self.context.get("csvRowNumber").and_then(Value::as_u64)
    }

    pub fn field_name(&self) -> Option<&str> {
        self.context.get("fieldName").and_then(Value::as_str)
    }

    pub fn insert_context_field<V: Serialize>(&mut self, name: impl Into<String>, value: V) {
        let serialized = serde_json::to_value(value).unwrap_or(Value::Null);
        self.context.insert(name.into(), serialized);
    }

    pub fn with_context_field<V: Serialize>(mut self, name: impl Into<String>, value: V) -> Self {
        self.insert_context_field(name, value);
        self
    }

    pub fn set_location(&mut self, file: impl Into<String>, field: impl Into<String>, row: u64) {
        self.insert_context_field("filename", file.into());
        self.insert_context_field("fieldName", field.into());
        self.insert_context_field("csvRowNumber", row);
    }

    pub fn with_location(
        mut self,
        file: impl Into<String>,
        field: impl Into<String>,
        row: u64,
    ) -> Self {
        self.set_location(file, field, row);
        self
    }

    /// Location without a field, for row-level findings.
    pub fn with_row(self, file: impl Into<String>, row: u64) -> Self {
        self.with_context_field("filename", file.into())
            .with_context_field("csvRowNumber", row)
    }

    pub fn with_file(self, file: impl Into<String>) -> Self {
        self.with_context_field("filename", file.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: NoticeCode = NoticeCode::warning("sample_code");

    #[test]
    fn severity_comes_from_the_code() {
        let notice = ValidationNotice::new(SAMPLE, "message");
        assert_eq!(notice.code(), "sample_code");
        assert_eq!(notice.severity(), NoticeSeverity::Warning);
    }

    #[test]
    fn severities_order_errors_first() {
        let mut severities = vec![
            NoticeSeverity::Info,
            NoticeSeverity::Error,
            NoticeSeverity::Warning,
        ];
        severities.sort();
        assert_eq!(
            severities,
            vec![
                NoticeSeverity::Error,
                NoticeSeverity::Warning,
                NoticeSeverity::Info
            ]
        );
        assert_eq!(
            serde_json::to_string(&NoticeSeverity::Warning).unwrap(),
            "\"WARNING\""
        );
    }

    #[test]
    fn location_is_stored_in_context() {
        let notice = ValidationNotice::new(SAMPLE, "bad value")
            .with_location("stops.txt", "stop_lat", 7)
            .with_context_field("fieldValue", "abc");

        assert_eq!(notice.filename(), Some("stops.txt"));
        assert_eq!(notice.field_name(), Some("stop_lat"));
        assert_eq!(notice.row_number(), Some(7));
        assert_eq!(
            notice.context_field("fieldValue"),
            Some(&Value::String("abc".into()))
        );
    }

    #[test]
    fn validator_error_names_the_unit() {
        let notice = ValidationNotice::validator_error("exploding", "boom");
        assert_eq!(notice.code(), VALIDATOR_ERROR.name());
        assert_eq!(notice.severity(), NoticeSeverity::Error);
        assert_eq!(
            notice.context_field("validator"),
            Some(&Value::String("exploding".into()))
        );
    }

    #[test]
    fn round_trips_through_json() {
        let notice = ValidationNotice::new(SAMPLE, "message").with_row("trips.txt", 3);
        let json = serde_json::to_string(&notice).unwrap();
        let back: ValidationNotice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, notice);
    }
}
