//! Price-list entries of a single product.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catalog_core::{AggregateRoot, Measure};
use catalog_products::{PriceList, PriceListId, ProductId};

use crate::command_dispatcher::{CatalogQuery, DispatchError};
use crate::settings::ProductSettings;
use crate::store::CatalogTx;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntryResponse {
    pub price_list_id: PriceListId,
    pub price_list_name: String,
    pub currency: String,
    pub net_price: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPriceListForm {
    pub id: ProductId,
    pub version: u64,
    pub name: String,
    pub code: String,
    pub entries: Vec<PriceEntryResponse>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetProductPriceListForm {
    pub id: ProductId,
}

#[async_trait]
impl CatalogQuery for GetProductPriceListForm {
    type Output = ProductPriceListForm;
    const NAME: &'static str = "products.price_list_form";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<ProductPriceListForm, DispatchError> {
        let product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        let price_lists = tx.price_lists().await?;

        let entries = product
            .prices()
            .iter()
            .filter_map(|price| {
                let list = price_lists.iter().find(|l| l.id == price.price_list_id)?;
                Some(PriceEntryResponse {
                    price_list_id: list.id,
                    price_list_name: list.name.clone(),
                    currency: list.currency.clone(),
                    net_price: price.net_price,
                })
            })
            .collect();

        Ok(ProductPriceListForm {
            id: product.id_typed(),
            version: product.version(),
            name: product.name().to_string(),
            code: product.code().to_string(),
            entries,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingPriceListEntries {
    pub entries: Vec<PriceList>,
}

/// Price lists the product has no entry on yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetMissingPriceListEntries {
    pub id: ProductId,
}

#[async_trait]
impl CatalogQuery for GetMissingPriceListEntries {
    type Output = MissingPriceListEntries;
    const NAME: &'static str = "products.price_list_missing_entries";

    async fn execute(
        &self,
        tx: &mut dyn CatalogTx,
        _settings: &ProductSettings,
    ) -> Result<MissingPriceListEntries, DispatchError> {
        let product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        let entries = tx
            .price_lists()
            .await?
            .into_iter()
            .filter(|list| !product.prices().iter().any(|p| p.price_list_id == list.id))
            .collect();
        Ok(MissingPriceListEntries { entries })
    }
}
