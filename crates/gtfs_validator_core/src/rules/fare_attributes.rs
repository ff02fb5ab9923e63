use crate::feed::FARE_ATTRIBUTES_FILE;
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const INVALID_CURRENCY: NoticeCode = NoticeCode::error("invalid_currency");
const NEGATIVE_FARE_PRICE: NoticeCode = NoticeCode::error("negative_fare_price");

/// Active ISO 4217 codes, sorted for binary search.
const ISO_4217_CODES: &[&str] = &[
    "AED", "AFN", "ALL", "AMD", "ANG", "AOA", "ARS", "AUD", "AWG", "AZN", "BAM", "BBD", "BDT",
    "BGN", "BHD", "BIF", "BMD", "BND", "BOB", "BRL", "BSD", "BTN", "BWP", "BYN", "BZD", "CAD",
    "CDF", "CHF", "CLP", "CNY", "COP", "CRC", "CUP", "CVE", "CZK", "DJF", "DKK", "DOP", "DZD",
    "EGP", "ERN", "ETB", "EUR", "FJD", "FKP", "GBP", "GEL", "GHS", "GIP", "GMD", "GNF", "GTQ",
    "GYD", "HKD", "HNL", "HTG", "HUF", "IDR", "ILS", "INR", "IQD", "IRR", "ISK", "JMD", "JOD",
    "JPY", "KES", "KGS", "KHR", "KMF", "KPW", "KRW", "KWD", "KYD", "KZT", "LAK", "LBP", "LKR",
    "LRD", "LSL", "LYD", "MAD", "MDL", "MGA", "MKD", "MMK", "MNT", "MOP", "MRU", "MUR", "MVR",
    "MWK", "MXN", "MYR", "MZN", "NAD", "NGN", "NIO", "NOK", "NPR", "NZD", "OMR", "PAB", "PEN",
    "PGK", "PHP", "PKR", "PLN", "PYG", "QAR", "RON", "RSD", "RUB", "RWF", "SAR", "SBD", "SCR",
    "SDG", "SEK", "SGD", "SHP", "SLE", "SOS", "SRD", "SSP", "STN", "SVC", "SYP", "SZL", "THB",
    "TJS", "TMT", "TND", "TOP", "TRY", "TTD", "TWD", "TZS", "UAH", "UGX", "USD", "UYU", "UZS",
    "VES", "VND", "VUV", "WST", "XAF", "XCD", "XOF", "XPF", "YER", "ZAR", "ZMW", "ZWL",
];

fn is_currency_code(value: &str) -> bool {
    ISO_4217_CODES.binary_search(&value).is_ok()
}

#[derive(Debug, Default)]
pub struct FareAttributesValidator;

impl Validator for FareAttributesValidator {
    fn name(&self) -> &'static str {
        "fare_attributes"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        scan_table(feed, FARE_ATTRIBUTES_FILE, |row| {
            let fare_id = row.get("fare_id").unwrap_or("").trim();

            if let Some(currency) = row.non_empty("currency_type") {
                if !is_currency_code(currency) {
                    notices.add(
                        ValidationNotice::new(
                            INVALID_CURRENCY,
                            format!("{currency} is not an ISO 4217 currency code"),
                        )
                        .with_location(FARE_ATTRIBUTES_FILE, "currency_type", row.line_number())
                        .with_context_field("fieldValue", currency)
                        .with_context_field("fareId", fare_id),
                    );
                }
            }

            let price = row
                .non_empty("price")
                .and_then(|value| value.parse::<f64>().ok());
            if let Some(price) = price.filter(|price| *price < 0.0) {
                notices.add(
                    ValidationNotice::new(NEGATIVE_FARE_PRICE, "fare price is negative")
                        .with_location(FARE_ATTRIBUTES_FILE, "price", row.line_number())
                        .with_context_field("fieldValue", price)
                        .with_context_field("fareId", fare_id),
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use crate::MemoryFeed;

    #[test]
    fn currency_table_is_sorted() {
        assert!(ISO_4217_CODES.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(is_currency_code("EUR"));
        assert!(!is_currency_code("eur"));
        assert!(!is_currency_code("XYZ"));
    }

    #[test]
    fn flags_bad_currency_and_negative_price() {
        let feed = MemoryFeed::new().with_table(
            FARE_ATTRIBUTES_FILE,
            "fare_id,price,currency_type,payment_method,transfers\n\
             F1,2.50,EUR,0,0\n\
             F2,-1,EUR,0,0\n\
             F3,1.00,EURO,0,0\n",
        );

        let notices = run(&FareAttributesValidator, &feed);

        assert_eq!(notices.count("negative_fare_price"), 1);
        assert_eq!(notices.count("invalid_currency"), 1);
        assert_eq!(notices.total_count(), 2);
    }
}
