//! Infrastructure layer: persistence, the command/query pipeline and the
//! catalog's commands and queries.

pub mod command_dispatcher;
pub mod commands;
pub mod numbering;
pub mod queries;
pub mod settings;
pub mod store;

#[cfg(test)]
mod integration_tests;

pub use command_dispatcher::{CatalogCommand, CatalogQuery, CommandContext, CommandDispatcher, DispatchError};
pub use settings::{HasWeightBehaviour, ProductSettings};
pub use store::{CatalogStore, CatalogTx, InMemoryCatalogStore, PostgresCatalogStore, StoreError};
