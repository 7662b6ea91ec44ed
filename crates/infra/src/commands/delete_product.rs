use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catalog_core::{AggregateRoot, ExpectedVersion, ValidationSummary};
use catalog_products::ProductId;

use crate::command_dispatcher::{CatalogCommand, CommandContext, DispatchError};
use crate::store::CatalogTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProductRequest {
    pub id: ProductId,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[async_trait]
impl CatalogCommand for DeleteProductRequest {
    const NAME: &'static str = "products.delete";

    type Output = ();

    async fn validate(&self, tx: &mut dyn CatalogTx, _ctx: &CommandContext) -> Result<ValidationSummary, DispatchError> {
        if tx.product(self.id).await?.is_none() {
            return Ok(ValidationSummary::single("id", "product does not exist"));
        }
        Ok(ValidationSummary::new())
    }

    /// PLU variants go first; alternative units and prices cascade with
    /// the product row.
    async fn handle(&self, tx: &mut dyn CatalogTx, ctx: &mut CommandContext) -> Result<(), DispatchError> {
        let mut product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        ExpectedVersion::from(self.expected_version).check(product.version())?;

        let removed = tx.delete_plu_variants(self.id).await?;
        tx.delete_product(self.id).await?;
        if let Some(attributes_id) = product.data().attributes_data_id {
            tx.delete_attribute_data(attributes_id).await?;
        }
        tracing::debug!(product_id = %self.id, plu_variants = removed, "product removed");

        product.begin_change(ctx.now);
        product.mark_deleted();
        ctx.record(&mut product)?;
        Ok(())
    }
}
