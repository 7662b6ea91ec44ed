//! Guard helpers used by aggregate mutators.
//!
//! Each helper checks one condition and names the offending field, so the
//! error can be reported next to the input that caused it.

use crate::error::{DomainError, DomainResult};

/// Fail with `message` for `field` unless `condition` holds.
pub fn verify(condition: bool, field: &str, message: &str) -> DomainResult<()> {
    if condition {
        Ok(())
    } else {
        Err(DomainError::invalid_value(field, message))
    }
}

/// `value >= 0` (using the type's default as zero).
pub fn non_negative<T>(value: T, field: &str) -> DomainResult<()>
where
    T: PartialOrd + Default,
{
    verify(value >= T::default(), field, "must be greater than or equal to 0")
}

/// Optional variant of [`non_negative`]; `None` passes.
pub fn non_negative_opt<T>(value: Option<T>, field: &str) -> DomainResult<()>
where
    T: PartialOrd + Default,
{
    match value {
        Some(v) => non_negative(v, field),
        None => Ok(()),
    }
}

/// `min <= max` when both bounds are present.
pub fn ordered<T>(min: Option<T>, max: Option<T>, field: &str) -> DomainResult<()>
where
    T: PartialOrd,
{
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(DomainError::invalid_value(
            field,
            "minimum must be less than or equal to maximum",
        )),
        _ => Ok(()),
    }
}

/// Non-blank string.
pub fn not_blank(value: &str, field: &str) -> DomainResult<()> {
    verify(!value.trim().is_empty(), field, "must not be empty")
}
