//! Field-level validation results.
//!
//! Commands are checked before any state is touched. Every rule that fails
//! adds one [`ValidationFailure`] naming the offending property; an empty
//! [`ValidationSummary`] means the input is acceptable.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub property: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub errors: Vec<ValidationFailure>,
}

impl ValidationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(property: impl Into<String>, message: impl Into<String>) -> Self {
        let mut summary = Self::new();
        summary.add(property, message);
        summary
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add(&mut self, property: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationFailure {
            property: property.into(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: ValidationSummary) {
        self.errors.extend(other.errors);
    }

    pub fn has_error_for(&self, property: &str) -> bool {
        self.errors.iter().any(|e| e.property == property)
    }
}

impl From<DomainError> for ValidationSummary {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidValue { field, message } => Self::single(field, message),
            DomainError::Validation(message) => Self::single("", message),
            other => Self::single("", other.to_string()),
        }
    }
}

/// Declarative rule builder.
///
/// ```ignore
/// let mut v = Validator::new();
/// v.not_empty("name", &req.name);
/// v.max_length("code", &req.code, 255);
/// v.ordered("max_weight", req.min_weight, req.max_weight);
/// let summary = v.finish();
/// ```
#[derive(Debug, Default)]
pub struct Validator {
    summary: ValidationSummary,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a failure for `property` unless `condition` holds.
    pub fn check(&mut self, condition: bool, property: impl Into<String>, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.summary.add(property, message);
        }
        self
    }

    pub fn not_empty(&mut self, property: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), property, "must not be empty")
    }

    /// Non-blank values are stored exactly as sent, so they may not carry
    /// leading or trailing whitespace.
    pub fn trimmed(&mut self, property: &str, value: &str) -> &mut Self {
        let trimmed = value.trim();
        self.check(
            trimmed.is_empty() || trimmed == value,
            property,
            "must not start or end with whitespace",
        )
    }

    pub fn required<T>(&mut self, property: &str, value: Option<&T>) -> &mut Self {
        self.check(value.is_some(), property, "is required")
    }

    pub fn max_length(&mut self, property: &str, value: &str, max: usize) -> &mut Self {
        self.check(
            value.chars().count() <= max,
            property,
            format!("must be {max} characters or fewer"),
        )
    }

    pub fn max_length_opt(&mut self, property: &str, value: Option<&str>, max: usize) -> &mut Self {
        match value {
            Some(v) => self.max_length(property, v, max),
            None => self,
        }
    }

    pub fn at_least<T: PartialOrd>(&mut self, property: &str, value: T, min: T) -> &mut Self {
        let ok = value >= min;
        self.check(ok, property, "is below the allowed minimum")
    }

    pub fn non_negative<T: PartialOrd + Default>(&mut self, property: &str, value: T) -> &mut Self {
        self.check(value >= T::default(), property, "must be greater than or equal to 0")
    }

    pub fn non_negative_opt<T: PartialOrd + Default>(&mut self, property: &str, value: Option<T>) -> &mut Self {
        match value {
            Some(v) => self.non_negative(property, v),
            None => self,
        }
    }

    /// `min <= max` when both are present; reported against `property`.
    pub fn ordered<T: PartialOrd>(&mut self, property: &str, min: Option<T>, max: Option<T>) -> &mut Self {
        let ok = match (min, max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        };
        self.check(ok, property, "minimum must be less than or equal to maximum")
    }

    /// Items must be unique by `key`; every repeat is reported as
    /// `collection[index].field`.
    pub fn unique_by<T, K, F>(&mut self, collection: &str, field: &str, items: &[T], key: F) -> &mut Self
    where
        K: PartialEq,
        F: Fn(&T) -> K,
    {
        for (i, item) in items.iter().enumerate() {
            let k = key(item);
            if items[..i].iter().any(|earlier| key(earlier) == k) {
                self.summary
                    .add(format!("{collection}[{i}].{field}"), "must be unique");
            }
        }
        self
    }

    /// Like [`Validator::unique_by`], but items whose key is `None` are
    /// never compared.
    pub fn unique_by_present<T, K, F>(&mut self, collection: &str, field: &str, items: &[T], key: F) -> &mut Self
    where
        K: PartialEq,
        F: Fn(&T) -> Option<K>,
    {
        for (i, item) in items.iter().enumerate() {
            let Some(k) = key(item) else { continue };
            if items[..i].iter().any(|earlier| key(earlier).as_ref() == Some(&k)) {
                self.summary
                    .add(format!("{collection}[{i}].{field}"), "must be unique");
            }
        }
        self
    }

    /// Fold a guard result into the summary.
    pub fn guard(&mut self, result: Result<(), DomainError>) -> &mut Self {
        if let Err(err) = result {
            self.summary.merge(err.into());
        }
        self
    }

    pub fn add(&mut self, property: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.summary.add(property, message);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.summary.is_valid()
    }

    pub fn finish(self) -> ValidationSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_every_failure() {
        let mut v = Validator::new();
        v.not_empty("name", " ")
            .max_length("code", &"x".repeat(256), 255)
            .non_negative("tare", -1.0)
            .ordered("max_weight", Some(5.0), Some(1.0));
        let summary = v.finish();

        let props: Vec<_> = summary.errors.iter().map(|e| e.property.as_str()).collect();
        assert_eq!(props, ["name", "code", "tare", "max_weight"]);
    }

    #[test]
    fn trimmed_ignores_blank_values() {
        let mut v = Validator::new();
        v.trimmed("name", " Milk").trimmed("code", "   ").trimmed("cn_code", "0401");
        let summary = v.finish();

        assert_eq!(summary.errors.len(), 1);
        assert!(summary.has_error_for("name"));
    }

    #[test]
    fn unique_by_reports_repeats_with_index() {
        let mut v = Validator::new();
        v.unique_by("alternative_units", "target_unit_id", &[1, 2, 1, 1], |x| *x);
        let summary = v.finish();

        assert!(summary.has_error_for("alternative_units[2].target_unit_id"));
        assert!(summary.has_error_for("alternative_units[3].target_unit_id"));
        assert_eq!(summary.errors.len(), 2);
    }

    #[test]
    fn unique_by_present_ignores_missing_keys() {
        let mut v = Validator::new();
        v.unique_by_present("alternative_units", "id", &[None, Some(7), None, Some(7)], |x| *x);
        let summary = v.finish();

        assert_eq!(summary.errors.len(), 1);
        assert!(summary.has_error_for("alternative_units[3].id"));
    }

    #[test]
    fn domain_errors_become_single_entries() {
        let summary: ValidationSummary = DomainError::invalid_value("weight_unit_id", "must be weighted").into();
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].property, "weight_unit_id");
    }

    #[test]
    fn serializes_as_errors_list() {
        let json = serde_json::to_value(ValidationSummary::single("code", "taken")).unwrap();
        assert_eq!(json, serde_json::json!({"errors": [{"property": "code", "message": "taken"}]}));
    }
}
