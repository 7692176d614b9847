//! Parsed control request and typed parameter extraction.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ControlError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// One inbound control request: an operation name and its string parameters.
///
/// Parameters keep arrival order; lookups use the first occurrence of a name.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRequest {
    id: u64,
    operation: String,
    params: Vec<(String, String)>,
}

impl ControlRequest {
    pub fn new(operation: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            operation: operation.into(),
            params,
        }
    }

    /// Append a parameter; convenient for building requests in code.
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn raw(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    // ====== STRINGS ======

    pub fn string(&self, name: &'static str) -> Result<&str, ControlError> {
        self.raw(name)
            .ok_or(ControlError::MissingParameter { name })
    }

    /// Present and non-empty, otherwise `None`.
    pub fn optional_string(&self, name: &str) -> Option<&str> {
        self.raw(name).filter(|value| !value.is_empty())
    }

    // ====== NUMBERS ======

    pub fn u32(&self, name: &'static str) -> Result<u32, ControlError> {
        self.parse(name, "an unsigned integer")
    }

    pub fn u64(&self, name: &'static str) -> Result<u64, ControlError> {
        self.parse(name, "an unsigned integer")
    }

    pub fn i64(&self, name: &'static str) -> Result<i64, ControlError> {
        self.parse(name, "an integer")
    }

    pub fn f32(&self, name: &'static str) -> Result<f32, ControlError> {
        let value: f32 = self.parse(name, "a number")?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(name, "a finite number"))
        }
    }

    pub fn f64(&self, name: &'static str) -> Result<f64, ControlError> {
        let value: f64 = self.parse(name, "a number")?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(name, "a finite number"))
        }
    }

    /// Accepts `1/0`, `true/false`, `yes/no` and `on/off`.
    pub fn bool(&self, name: &'static str) -> Result<bool, ControlError> {
        let raw = self.string(name)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(self.invalid(name, "a boolean")),
        }
    }

    /// Unsigned integer in `0..=max`.
    pub fn u8_at_most(&self, name: &'static str, max: u8) -> Result<u8, ControlError> {
        let value = self.u32(name)?;
        if value > u32::from(max) {
            return Err(ControlError::OutOfRange {
                name,
                value: value.to_string(),
                limit: max.to_string(),
            });
        }
        Ok(value as u8)
    }

    /// Unsigned index strictly below `count`.
    pub fn index_below(&self, name: &'static str, count: u32) -> Result<u32, ControlError> {
        let value = self.u32(name)?;
        if value >= count {
            return Err(ControlError::OutOfRange {
                name,
                value: value.to_string(),
                limit: format!("< {}", count),
            });
        }
        Ok(value)
    }

    fn parse<T: FromStr>(&self, name: &'static str, expected: &'static str) -> Result<T, ControlError> {
        let raw = self.string(name)?;
        raw.trim()
            .parse::<T>()
            .map_err(|_| self.invalid(name, expected))
    }

    fn invalid(&self, name: &'static str, expected: &'static str) -> ControlError {
        ControlError::InvalidParameter {
            name,
            value: self.raw(name).unwrap_or_default().to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ControlRequest {
        ControlRequest::new("set-volume", Vec::new())
    }

    #[test]
    fn request_ids_are_unique() {
        let a = request();
        let b = request();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn missing_and_malformed_parameters_are_distinguished() {
        let req = request().with_param("index", "abc");
        assert_eq!(
            req.u32("pluginId"),
            Err(ControlError::MissingParameter { name: "pluginId" })
        );
        assert!(matches!(
            req.u32("index"),
            Err(ControlError::InvalidParameter { name: "index", .. })
        ));
    }

    #[test]
    fn negative_index_is_invalid_not_wrapped() {
        let req = request().with_param("index", "-1");
        assert!(matches!(
            req.u32("index"),
            Err(ControlError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn index_below_rejects_out_of_range() {
        let req = request().with_param("index", 2);
        assert_eq!(req.index_below("index", 3), Ok(2));
        assert!(matches!(
            req.index_below("index", 2),
            Err(ControlError::OutOfRange { name: "index", .. })
        ));
    }

    #[test]
    fn floats_must_be_finite() {
        assert_eq!(request().with_param("value", "0.5").f32("value"), Ok(0.5));
        assert!(request().with_param("value", "NaN").f32("value").is_err());
        assert!(request().with_param("bpm", "inf").f64("bpm").is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for (raw, expected) in [("1", true), ("TRUE", true), ("off", false), ("0", false)] {
            assert_eq!(request().with_param("onOff", raw).bool("onOff"), Ok(expected));
        }
        assert!(request().with_param("onOff", "maybe").bool("onOff").is_err());
    }

    #[test]
    fn u8_at_most_bounds_midi_values() {
        assert_eq!(request().with_param("note", 127).u8_at_most("note", 127), Ok(127));
        assert!(matches!(
            request().with_param("note", 128).u8_at_most("note", 127),
            Err(ControlError::OutOfRange { .. })
        ));
    }

    #[test]
    fn first_occurrence_wins_and_empty_optional_is_absent() {
        let req = request()
            .with_param("name", "")
            .with_param("label", "a")
            .with_param("label", "b");
        assert_eq!(req.optional_string("name"), None);
        assert_eq!(req.optional_string("label"), Some("a"));
        assert_eq!(req.string("name"), Ok(""));
    }
}
