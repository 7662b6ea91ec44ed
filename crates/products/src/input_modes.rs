//! How quantities, weights and sizes are captured at the point of use.
//!
//! Each field allows a set of modes, persisted as an integer bit set and
//! exchanged as a list of mode names.

use core::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub trait InputMode: Copy + Eq + core::fmt::Debug + 'static {
    const ALL: &'static [Self];

    fn bit(self) -> i32;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityInputMode {
    FromScale,
    FromUserInput,
}

impl InputMode for QuantityInputMode {
    const ALL: &'static [Self] = &[Self::FromScale, Self::FromUserInput];

    fn bit(self) -> i32 {
        match self {
            Self::FromScale => 1,
            Self::FromUserInput => 2,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInputMode {
    FromScale,
    FromUserInput,
    /// Derived from the quantity; meaningless when the base unit is itself a
    /// weight.
    FromQuantity,
}

impl InputMode for WeightInputMode {
    const ALL: &'static [Self] = &[Self::FromScale, Self::FromUserInput, Self::FromQuantity];

    fn bit(self) -> i32 {
        match self {
            Self::FromScale => 1,
            Self::FromUserInput => 2,
            Self::FromQuantity => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeInputMode {
    FromUserInput,
    FromScanner,
}

impl InputMode for SizeInputMode {
    const ALL: &'static [Self] = &[Self::FromUserInput, Self::FromScanner];

    fn bit(self) -> i32 {
        match self {
            Self::FromUserInput => 1,
            Self::FromScanner => 2,
        }
    }
}

/// Set of input modes of one kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InputModes<M> {
    bits: i32,
    _mode: PhantomData<M>,
}

impl<M: InputMode> InputModes<M> {
    pub fn empty() -> Self {
        Self {
            bits: 0,
            _mode: PhantomData,
        }
    }

    /// Unknown bits are dropped.
    pub fn from_bits(bits: i32) -> Self {
        M::ALL.iter().filter(|m| bits & m.bit() != 0).copied().collect()
    }

    pub fn bits(self) -> i32 {
        self.bits
    }

    pub fn contains(self, mode: M) -> bool {
        self.bits & mode.bit() != 0
    }

    pub fn insert(&mut self, mode: M) {
        self.bits |= mode.bit();
    }

    /// Returns whether the mode was present.
    pub fn remove(&mut self, mode: M) -> bool {
        let present = self.contains(mode);
        self.bits &= !mode.bit();
        present
    }

    pub fn without(mut self, mode: M) -> Self {
        self.remove(mode);
        self
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = M> {
        M::ALL.iter().copied().filter(move |m| self.contains(*m))
    }
}

impl<M: InputMode> Default for InputModes<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M: InputMode> FromIterator<M> for InputModes<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        let mut modes = Self::empty();
        for m in iter {
            modes.insert(m);
        }
        modes
    }
}

impl<M: InputMode, const N: usize> From<[M; N]> for InputModes<M> {
    fn from(modes: [M; N]) -> Self {
        modes.into_iter().collect()
    }
}

impl<M: InputMode + Serialize> Serialize for InputModes<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, M: InputMode + Deserialize<'de>> Deserialize<'de> for InputModes<M> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let modes = Vec::<M>::deserialize(deserializer)?;
        Ok(modes.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let mut modes = InputModes::from([WeightInputMode::FromScale, WeightInputMode::FromQuantity]);
        assert_eq!(modes.bits(), 5);
        assert!(modes.remove(WeightInputMode::FromQuantity));
        assert!(!modes.remove(WeightInputMode::FromQuantity));
        assert_eq!(modes.iter().collect::<Vec<_>>(), vec![WeightInputMode::FromScale]);
    }

    #[test]
    fn from_bits_ignores_unknown_bits() {
        let modes = InputModes::<SizeInputMode>::from_bits(0b1111);
        assert_eq!(modes.bits(), 3);
    }

    #[test]
    fn json_is_a_list_of_names() {
        let modes = InputModes::from([QuantityInputMode::FromUserInput, QuantityInputMode::FromScale]);
        let json = serde_json::to_value(modes).unwrap();
        assert_eq!(json, serde_json::json!(["from_scale", "from_user_input"]));

        let back: InputModes<QuantityInputMode> = serde_json::from_value(json).unwrap();
        assert_eq!(back, modes);
    }
}
