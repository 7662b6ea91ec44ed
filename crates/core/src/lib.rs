//! `catalog-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod guard;
pub mod id;
pub mod measure;
pub mod validation;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::{Entity, reconcile};
pub use error::{DomainError, DomainResult};
pub use id::AggregateId;
pub use measure::Measure;
pub use validation::{ValidationFailure, ValidationSummary, Validator};
pub use value_object::ValueObject;
