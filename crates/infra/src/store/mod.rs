//! Transactional catalog storage.
//!
//! Every command and query runs inside one [`CatalogTx`]. Changes become
//! visible to other transactions only after [`CatalogTx::commit`]; dropping a
//! transaction without committing rolls it back.

use async_trait::async_trait;
use thiserror::Error;

use catalog_products::{
    AttributeData, AttributeDataId, AttributeModel, CategoryId, NumberGeneratorTemplate, PluVariant, PriceList,
    PriceListId, Product, ProductCategory, ProductId, TaxRate, TaxRateId, TemplateId, Unit, UnitId,
};

use crate::queries::data_table::{DataTableQuery, ProductRow};

pub mod in_memory;
pub mod postgres;
pub mod seed;

pub use in_memory::InMemoryCatalogStore;
pub use postgres::PostgresCatalogStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A row the operation depends on does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The row was changed by another transaction (stale version).
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// A unique index rejected the write; carries the offending property.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(String),

    /// A foreign key rejected the write.
    #[error("foreign key violated: {0}")]
    ForeignKey(String),

    /// A persisted row could not be mapped back into the domain.
    #[error("corrupt row: {0}")]
    Decode(String),

    #[error("database error in {operation}: {message}")]
    Database { operation: &'static str, message: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Which products a listing query returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductSelection {
    All,
    Ids(Vec<ProductId>),
    Codes(Vec<String>),
}

/// Entry point: opens transactions.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>, StoreError>;
}

/// One unit of work against the catalog.
#[async_trait]
pub trait CatalogTx: Send {
    // Reference data.

    async fn units(&mut self) -> Result<Vec<Unit>, StoreError>;

    async fn unit(&mut self, id: UnitId) -> Result<Option<Unit>, StoreError> {
        Ok(self.units().await?.into_iter().find(|u| u.id == id))
    }

    async fn categories(&mut self) -> Result<Vec<ProductCategory>, StoreError>;

    async fn category(&mut self, id: CategoryId) -> Result<Option<ProductCategory>, StoreError> {
        Ok(self.categories().await?.into_iter().find(|c| c.id == id))
    }

    async fn tax_rates(&mut self) -> Result<Vec<TaxRate>, StoreError>;

    async fn tax_rate(&mut self, id: TaxRateId) -> Result<Option<TaxRate>, StoreError> {
        Ok(self.tax_rates().await?.into_iter().find(|t| t.id == id))
    }

    async fn templates(&mut self) -> Result<Vec<NumberGeneratorTemplate>, StoreError>;

    async fn template(&mut self, id: TemplateId) -> Result<Option<NumberGeneratorTemplate>, StoreError> {
        Ok(self.templates().await?.into_iter().find(|t| t.id == id))
    }

    async fn price_lists(&mut self) -> Result<Vec<PriceList>, StoreError>;

    async fn price_list(&mut self, id: PriceListId) -> Result<Option<PriceList>, StoreError> {
        Ok(self.price_lists().await?.into_iter().find(|p| p.id == id))
    }

    async fn attribute_models(&mut self) -> Result<Vec<AttributeModel>, StoreError>;

    // Attribute data.

    async fn attribute_data(&mut self, id: AttributeDataId) -> Result<Option<AttributeData>, StoreError>;

    async fn insert_attribute_data(&mut self, data: &AttributeData) -> Result<(), StoreError>;

    async fn update_attribute_data(&mut self, data: &AttributeData) -> Result<(), StoreError>;

    async fn delete_attribute_data(&mut self, id: AttributeDataId) -> Result<(), StoreError>;

    // Products.

    /// Load a product with its alternative units and prices.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError>;

    /// Products ordered by name, then id.
    async fn products(&mut self, selection: &ProductSelection) -> Result<Vec<Product>, StoreError>;

    async fn code_taken(&mut self, code: &str, except: Option<ProductId>) -> Result<bool, StoreError>;

    /// Insert a new product; bumps its version to 1.
    async fn insert_product(&mut self, product: &mut Product) -> Result<u64, StoreError>;

    /// Write back a loaded product. Fails with [`StoreError::Conflict`] when
    /// the stored version no longer matches the one it was loaded at.
    async fn update_product(&mut self, product: &mut Product) -> Result<u64, StoreError>;

    /// Remove a product; owned child rows go with it.
    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError>;

    async fn plu_variants(&mut self, product_id: ProductId) -> Result<Vec<PluVariant>, StoreError>;

    async fn insert_plu_variant(&mut self, variant: &PluVariant) -> Result<(), StoreError>;

    /// Returns the number of removed rows.
    async fn delete_plu_variants(&mut self, product_id: ProductId) -> Result<u64, StoreError>;

    /// One page of the product table plus the total number of matching rows.
    async fn product_page(&mut self, query: &DataTableQuery) -> Result<(Vec<ProductRow>, u64), StoreError>;

    // Numbering.

    /// Next value (starting at 1) of the named counter.
    async fn next_sequence(&mut self, name: &str) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
