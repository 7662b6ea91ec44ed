//! Aggregate root traits for change-tracked domain models.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// This is intentionally small so catalog modules can decide how they model
/// state transitions without bringing in any infrastructure concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's persisted state.
    ///
    /// Bumped once per committed change set, not once per mutator call.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the aggregate to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

impl From<Option<u64>> for ExpectedVersion {
    fn from(value: Option<u64>) -> Self {
        value.map(ExpectedVersion::Exact).unwrap_or(ExpectedVersion::Any)
    }
}

/// Change-tracking semantics.
///
/// - **Mutation**: named mutators on the aggregate validate one invariant each and
///   change state in place, recording an event for every observable change.
/// - **Persistence**: the application layer drains the recorded events once the
///   new state has been written, then publishes them after commit.
///
/// Aggregates must not perform IO.
pub trait Aggregate: AggregateRoot {
    type Event: Clone + core::fmt::Debug;

    /// Events recorded since the last drain, oldest first.
    fn pending_events(&self) -> &[Self::Event];

    /// Remove and return the recorded events.
    fn take_events(&mut self) -> Vec<Self::Event>;

    fn has_changes(&self) -> bool {
        !self.pending_events().is_empty()
    }
}
