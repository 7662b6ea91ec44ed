use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catalog_core::{AggregateRoot, ExpectedVersion, ValidationSummary, Validator};
use catalog_products::{ProductId, ProductType, UnitId};

use super::CreateResult;
use super::product_fields::{self, ProductFields, ResolvedUnits};
use crate::command_dispatcher::{CatalogCommand, CommandContext, DispatchError};
use crate::store::CatalogTx;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProductRequest {
    pub id: ProductId,
    /// Version the client last read; omitted means "don't check".
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub base_unit_id: Option<UnitId>,
    /// Omitted keeps the current type.
    #[serde(default)]
    pub product_type: Option<ProductType>,
    #[serde(flatten)]
    pub fields: ProductFields,
}

#[async_trait]
impl CatalogCommand for ChangeProductRequest {
    const NAME: &'static str = "products.change";

    type Output = CreateResult;

    async fn validate(&self, tx: &mut dyn CatalogTx, _ctx: &CommandContext) -> Result<ValidationSummary, DispatchError> {
        let mut v = Validator::new();
        v.required("base_unit_id", self.base_unit_id.as_ref())
            .not_empty("code", &self.fields.code);
        self.fields.check(&mut v, self.base_unit_id);

        if let Some(id) = self.base_unit_id {
            v.check(tx.unit(id).await?.is_some(), "base_unit_id", "does not exist");
        }
        product_fields::check_references(tx, &mut v, &self.fields).await?;

        let code = self.fields.code.as_str();
        if !code.trim().is_empty() && tx.code_taken(code, Some(self.id)).await? {
            v.add("code", "must be unique");
        }
        Ok(v.finish())
    }

    async fn handle(&self, tx: &mut dyn CatalogTx, ctx: &mut CommandContext) -> Result<CreateResult, DispatchError> {
        let mut product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        ExpectedVersion::from(self.expected_version).check(product.version())?;

        let base_unit_id = self
            .base_unit_id
            .ok_or_else(|| DispatchError::Validation(ValidationSummary::single("base_unit_id", "is required")))?;
        let units = ResolvedUnits {
            base: product_fields::load_unit(tx, base_unit_id).await?,
            weight: product_fields::load_optional_unit(tx, self.fields.weight_unit_id).await?,
            size: product_fields::load_optional_unit(tx, self.fields.size_unit_id).await?,
        };

        product.begin_change(ctx.now);
        product.change_code(self.fields.code.as_str())?;
        if let Some(product_type) = self.product_type {
            product.set_product_type(product_type);
        }
        product_fields::apply(&mut product, &self.fields, &units)?;

        let attributes = product_fields::save_attributes(tx, product.data().attributes_data_id, &self.fields).await?;
        product.set_attributes_data(attributes);

        tx.update_product(&mut product).await?;
        ctx.record(&mut product)?;

        Ok(CreateResult { id: self.id })
    }
}
