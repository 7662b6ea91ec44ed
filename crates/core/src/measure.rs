//! Fixed-point decimal with six fractional digits.
//!
//! Persisted as `NUMERIC(15,6)`; held in memory as an `i64` count of
//! millionths so arithmetic and comparison stay exact. On the wire a measure
//! is a decimal string (`"12.5"`); numbers are accepted on input too.

use core::fmt;
use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DomainError;
use crate::value_object::ValueObject;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Measure(i64);

impl Measure {
    pub const SCALE: i64 = 1_000_000;
    pub const FRACTION_DIGITS: usize = 6;
    /// Largest magnitude representable by `NUMERIC(15,6)`.
    pub const MAX_MICROS: i64 = 999_999_999_999_999;

    pub const ZERO: Measure = Measure(0);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn micros(self) -> i64 {
        self.0
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * Self::SCALE)
    }

    /// Round a float to the nearest millionth.
    pub fn from_f64(value: f64) -> Result<Self, DomainError> {
        if !value.is_finite() {
            return Err(DomainError::validation("measure must be a finite number"));
        }
        let micros = (value * Self::SCALE as f64).round();
        if micros.abs() > Self::MAX_MICROS as f64 {
            return Err(DomainError::validation("measure is out of range"));
        }
        Ok(Self(micros as i64))
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl ValueObject for Measure {}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        let whole = abs / scale;
        let frac = abs % scale;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:0width$}", width = Self::FRACTION_DIGITS);
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Measure {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::validation(format!("invalid measure: {s:?}"));

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > Self::FRACTION_DIGITS {
            return Err(DomainError::validation(format!(
                "measure {s:?} has more than {} fractional digits",
                Self::FRACTION_DIGITS
            )));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = Self::FRACTION_DIGITS);
            padded.parse().map_err(|_| invalid())?
        };

        let micros = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac))
            .filter(|m| *m <= Self::MAX_MICROS)
            .ok_or_else(|| DomainError::validation("measure is out of range"))?;

        Ok(Self(if negative { -micros } else { micros }))
    }
}

impl Serialize for Measure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct MeasureVisitor;

impl<'de> Visitor<'de> for MeasureVisitor {
    type Value = Measure;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal number or decimal string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Measure, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Measure, E> {
        v.checked_mul(Measure::SCALE)
            .filter(|m| m.abs() <= Measure::MAX_MICROS)
            .map(Measure)
            .ok_or_else(|| E::custom("measure is out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Measure, E> {
        let v = i64::try_from(v).map_err(|_| E::custom("measure is out of range"))?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Measure, E> {
        Measure::from_f64(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Measure {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MeasureVisitor)
    }
}
