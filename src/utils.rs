use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{ApiError, ApiResult};

/// Unpacks optional payload fields, returning 400 naming every absent one.
/// A field renamed on the wire can give its wire name with `as`.
///
/// ```ignore
/// require_fields!(payload { email, password });
/// // `email` and `password` are now bound to the unwrapped values
/// require_fields!(payload { message, notification_type as "type" });
/// ```
#[macro_export]
macro_rules! require_fields {
    ($payload:ident { $($field:ident $(as $name:literal)?),+ $(,)? }) => {
        let ($($field,)+) = match ($($payload.$field,)+) {
            ($(Some($field),)+) => ($($field,)+),
            ($($field,)+) => {
                let missing: Vec<&str> = [
                    $(($crate::__wire_name!($field $(, $name)?), $field.is_none())),+
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                return Err($crate::utils::missing_fields(&missing));
            }
        };
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __wire_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $name:literal) => {
        $name
    };
}

pub fn missing_fields(names: &[&str]) -> ApiError {
    ApiError::BadRequest(format!("Missing required fields: {}", names.join(", ")))
}

/// Parses the date formats clients send: RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// (taken as UTC) or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Like [`parse_datetime`] for an optional query parameter, rejecting bad input with 400.
pub fn parse_date_param(name: &str, value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match value {
        None => Ok(None),
        Some(raw) => parse_datetime(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid {name} format"))),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

/// Money columns are `NUMERIC(14, 2)`: magnitudes must stay below 10^12.
const MONEY_LIMIT: i64 = 1_000_000_000_000;

/// Whether `value` can be stored in a money column once rounded to cents.
pub fn fits_money_column(value: Decimal) -> bool {
    value
        .abs()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        < Decimal::from(MONEY_LIMIT)
}

pub fn ensure_money(name: &str, value: Decimal) -> ApiResult<()> {
    if fits_money_column(value) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("{name} is out of range")))
    }
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Returns `(limit, offset)` with the limit clamped to `1..=MAX_PAGE_SIZE`.
    pub fn resolve(&self, default_limit: i64) -> (i64, i64) {
        let limit = self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[derive(Default)]
    struct Payload {
        email: Option<String>,
        password: Option<String>,
        name: Option<String>,
    }

    fn check(payload: Payload) -> ApiResult<(String, String)> {
        require_fields!(payload { email, password });
        Ok((email, password))
    }

    #[test]
    fn test_require_fields_binds_values() {
        let payload = Payload {
            email: Some("a@example.com".into()),
            password: Some("secret".into()),
            name: None,
        };
        assert!(payload.name.is_none());
        let (email, password) = check(payload).unwrap();
        assert_eq!(email, "a@example.com");
        assert_eq!(password, "secret");
    }

    #[derive(Default)]
    struct Renamed {
        message: Option<String>,
        kind: Option<String>,
    }

    fn check_renamed(payload: Renamed) -> ApiResult<(String, String)> {
        require_fields!(payload { message, kind as "type" });
        Ok((message, kind))
    }

    #[test]
    fn test_require_fields_reports_wire_names() {
        let err = check_renamed(Renamed {
            message: Some("hi".into()),
            kind: None,
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: type");

        let err = check_renamed(Renamed::default()).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: message, type");
    }

    #[test]
    fn test_require_fields_lists_every_missing_field() {
        let err = check(Payload::default()).unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: email, password");
    }

    #[test]
    fn test_parse_datetime_formats() {
        let rfc = parse_datetime("2024-03-01T10:30:00Z").unwrap();
        assert_eq!((rfc.year(), rfc.month(), rfc.hour()), (2024, 3, 10));

        let spaced = parse_datetime("2024-03-01 10:30:00").unwrap();
        assert_eq!(spaced, rfc);

        let date_only = parse_datetime("2024-03-01").unwrap();
        assert_eq!((date_only.day(), date_only.hour()), (1, 0));

        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_parse_date_param_rejects_garbage() {
        assert!(parse_date_param("start_date", None).unwrap().is_none());
        let err = parse_date_param("start_date", Some("03/01/2024")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid start_date format");
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane.doe@example.com"));
        assert!(!is_valid_email("jane.doe"));
        assert!(!is_valid_email("jane@localhost"));
        assert!(!is_valid_email("jane doe@example.com"));
    }

    #[test]
    fn test_pagination_clamps() {
        assert_eq!(Pagination::default().resolve(10), (10, 0));
        let wide = Pagination { limit: Some(1000), offset: Some(-5) };
        assert_eq!(wide.resolve(20), (MAX_PAGE_SIZE, 0));
        let zero = Pagination { limit: Some(0), offset: Some(40) };
        assert_eq!(zero.resolve(20), (1, 40));
    }

    #[test]
    fn test_money_column_bounds() {
        let dec = |v: &str| v.parse::<Decimal>().unwrap();

        assert!(fits_money_column(dec("999999999999.99")));
        assert!(fits_money_column(dec("-999999999999.99")));
        // rounds up to 10^12 once stored with two decimals
        assert!(!fits_money_column(dec("999999999999.995")));
        assert!(!fits_money_column(dec("1000000000000000")));

        let err = ensure_money("amount", dec("-1000000000000")).unwrap_err();
        assert_eq!(err.to_string(), "amount is out of range");
    }
}
