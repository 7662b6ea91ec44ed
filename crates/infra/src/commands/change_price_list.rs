use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catalog_core::{AggregateRoot, ExpectedVersion, Measure, ValidationSummary, Validator};
use catalog_products::{ProductId, ProductPrice};

use super::CreateResult;
use crate::command_dispatcher::{CatalogCommand, CommandContext, DispatchError};
use crate::store::CatalogTx;

/// Replaces the product's price-list entries. Entries are matched by price
/// list: known lists are repriced, new ones added, missing ones removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProductPriceListRequest {
    pub id: ProductId,
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub prices: Vec<ProductPrice>,
}

#[async_trait]
impl CatalogCommand for ChangeProductPriceListRequest {
    const NAME: &'static str = "products.change_price_list";

    type Output = CreateResult;

    async fn validate(&self, tx: &mut dyn CatalogTx, _ctx: &CommandContext) -> Result<ValidationSummary, DispatchError> {
        let mut v = Validator::new();
        v.unique_by("prices", "price_list_id", &self.prices, |p| p.price_list_id);

        for (i, price) in self.prices.iter().enumerate() {
            v.check(
                price.net_price >= Measure::ZERO,
                format!("prices[{i}].net_price"),
                "must be greater than or equal to 0",
            );
            if tx.price_list(price.price_list_id).await?.is_none() {
                v.add(format!("prices[{i}].price_list_id"), "price list does not exist");
            }
        }
        if tx.product(self.id).await?.is_none() {
            v.add("id", "product does not exist");
        }
        Ok(v.finish())
    }

    async fn handle(&self, tx: &mut dyn CatalogTx, ctx: &mut CommandContext) -> Result<CreateResult, DispatchError> {
        let mut product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        ExpectedVersion::from(self.expected_version).check(product.version())?;

        product.begin_change(ctx.now);
        product.update_prices(self.prices.clone())?;

        tx.update_product(&mut product).await?;
        ctx.record(&mut product)?;
        Ok(CreateResult { id: self.id })
    }
}
