use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catalog_core::{ValidationSummary, Validator};
use catalog_products::{NewProduct, Product, ProductId, ProductType, UnitId};

use super::product_fields::{self, ProductFields, ResolvedUnits};
use super::{CreateResult, default_product_type};
use crate::command_dispatcher::{CatalogCommand, CommandContext, DispatchError};
use crate::numbering;
use crate::store::CatalogTx;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddProductRequest {
    /// Client-chosen id; assigned by the server when absent.
    #[serde(default)]
    pub id: Option<ProductId>,
    #[serde(default)]
    pub base_unit_id: Option<UnitId>,
    #[serde(default = "default_product_type")]
    pub product_type: ProductType,
    #[serde(flatten)]
    pub fields: ProductFields,
}

#[async_trait]
impl CatalogCommand for AddProductRequest {
    const NAME: &'static str = "products.add";

    type Output = CreateResult;

    async fn validate(&self, tx: &mut dyn CatalogTx, _ctx: &CommandContext) -> Result<ValidationSummary, DispatchError> {
        let mut v = Validator::new();
        v.required("base_unit_id", self.base_unit_id.as_ref());
        self.fields.check(&mut v, self.base_unit_id);

        if let Some(id) = self.base_unit_id {
            v.check(tx.unit(id).await?.is_some(), "base_unit_id", "does not exist");
        }
        product_fields::check_references(tx, &mut v, &self.fields).await?;

        let code = self.fields.code.as_str();
        if !code.trim().is_empty() && tx.code_taken(code, None).await? {
            v.add("code", "must be unique");
        }
        if let Some(id) = self.id {
            v.check(tx.product(id).await?.is_none(), "id", "already exists");
        }
        Ok(v.finish())
    }

    async fn handle(&self, tx: &mut dyn CatalogTx, ctx: &mut CommandContext) -> Result<CreateResult, DispatchError> {
        let settings = std::sync::Arc::clone(&ctx.settings);
        let (Some(base_unit_id), Some(purchase_tax_rate_id), Some(sales_tax_rate_id)) = (
            self.base_unit_id,
            self.fields.purchase_tax_rate_id,
            self.fields.sales_tax_rate_id,
        ) else {
            return Err(DispatchError::Validation(ValidationSummary::single(
                "base_unit_id",
                "base unit and tax rates are required",
            )));
        };

        let units = ResolvedUnits {
            base: product_fields::load_unit(tx, base_unit_id).await?,
            weight: product_fields::load_optional_unit(tx, self.fields.weight_unit_id.or(settings.default_weight_unit_id))
                .await?,
            size: product_fields::load_optional_unit(tx, self.fields.size_unit_id.or(settings.default_size_unit_id))
                .await?,
        };

        let code = if self.fields.code.trim().is_empty() {
            numbering::next_code(tx, &settings.code_template, ctx.now).await?
        } else {
            self.fields.code.clone()
        };

        let mut product = Product::create(
            NewProduct {
                id: self.id.unwrap_or_else(ProductId::new),
                name: self.fields.name.clone(),
                code,
                product_type: self.product_type,
                base_unit: &units.base,
                purchase_tax_rate_id,
                sales_tax_rate_id,
            },
            ctx.now,
        )?;
        product_fields::apply(&mut product, &self.fields, &units)?;

        let attributes = product_fields::save_attributes(tx, None, &self.fields).await?;
        product.set_attributes_data(attributes);

        tx.insert_product(&mut product).await?;
        ctx.record(&mut product)?;

        Ok(CreateResult {
            id: product.id_typed(),
        })
    }
}
