//! Product read queries.
//!
//! Every response carries the product's own fields plus the names of the
//! reference rows it points at. Reference tables are small, so they are
//! loaded once per query into a [`ReferenceLookup`] and joined in memory.

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use catalog_core::{AggregateRoot, Measure};
use catalog_products::{
    AlternativeUnitId, AttributeModelId, CategoryId, InputModes, Product, ProductCategory, ProductId, ProductPrice,
    ProductType, QuantityInputMode, SizeInputMode, TaxRate, TaxRateId, TemplateId, Unit, UnitId, WarehousingStrategy,
    WeightInputMode,
};

use crate::command_dispatcher::{CatalogQuery, DispatchError};
use crate::settings::ProductSettings;
use crate::store::{CatalogTx, ProductSelection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub file_name: String,
    /// Base64 (standard alphabet).
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeUnitResponse {
    pub id: AlternativeUnitId,
    pub target_unit_id: UnitId,
    pub target_unit_symbol: Option<String>,
    pub conversion_ratio: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub version: u64,
    pub name: String,
    pub code: String,
    pub product_type: ProductType,
    pub catalog_number: Option<String>,
    pub pkwiu_code: Option<String>,
    pub cn_code: Option<String>,
    pub description: Option<String>,
    pub image: Option<ImageResponse>,
    pub warehousing_strategy: WarehousingStrategy,

    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,

    pub base_unit_id: UnitId,
    pub base_unit_name: Option<String>,
    pub base_unit_symbol: Option<String>,
    pub base_unit_is_weighted: bool,
    pub weight_unit_id: Option<UnitId>,
    pub weight_unit_name: Option<String>,
    pub size_unit_id: Option<UnitId>,
    pub size_unit_name: Option<String>,
    pub alternative_units: Vec<AlternativeUnitResponse>,

    pub number_generator_template_id: Option<TemplateId>,
    pub number_generator_template_name: Option<String>,

    pub quantity_input_modes: InputModes<QuantityInputMode>,
    pub has_weight: bool,
    pub weight_input_modes: InputModes<WeightInputMode>,
    pub has_size: bool,
    pub size_input_modes: InputModes<SizeInputMode>,

    pub net_weight: Measure,
    pub tare: Measure,
    pub width: Measure,
    pub height: Measure,
    pub depth: Measure,
    pub quantity_step: f64,
    pub default_quantity: Measure,
    pub default_use_by_days: i32,
    pub default_freeze_days: i32,
    pub is_freezable: bool,
    pub is_perishable: bool,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub min_storage_temperature: Option<f64>,
    pub max_storage_temperature: Option<f64>,

    pub purchase_tax_rate_id: TaxRateId,
    pub purchase_tax_rate_name: Option<String>,
    pub purchase_tax_rate_value: Option<i32>,
    pub sales_tax_rate_id: TaxRateId,
    pub sales_tax_rate_name: Option<String>,
    pub sales_tax_rate_value: Option<i32>,

    pub prices: Vec<ProductPrice>,

    pub attributes_data_model_id: Option<AttributeModelId>,
    pub attributes: Option<JsonValue>,
    pub handling_unit_item_data_model_id: Option<AttributeModelId>,
    /// Only set on single-product responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes_use_case: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Reference rows keyed by id.
#[derive(Debug, Default)]
pub struct ReferenceLookup {
    units: HashMap<UnitId, Unit>,
    categories: HashMap<CategoryId, ProductCategory>,
    tax_rates: HashMap<TaxRateId, TaxRate>,
    templates: HashMap<TemplateId, String>,
}

impl ReferenceLookup {
    pub async fn load(tx: &mut dyn CatalogTx) -> Result<Self, DispatchError> {
        Ok(Self {
            units: tx.units().await?.into_iter().map(|u| (u.id, u)).collect(),
            categories: tx.categories().await?.into_iter().map(|c| (c.id, c)).collect(),
            tax_rates: tx.tax_rates().await?.into_iter().map(|t| (t.id, t)).collect(),
            templates: tx.templates().await?.into_iter().map(|t| (t.id, t.name)).collect(),
        })
    }

    fn unit(&self, id: Option<UnitId>) -> Option<&Unit> {
        id.and_then(|id| self.units.get(&id))
    }

    fn tax_rate(&self, id: TaxRateId) -> Option<&TaxRate> {
        self.tax_rates.get(&id)
    }
}

/// Assemble the response for one product, reading its attribute data.
pub async fn product_response(
    tx: &mut dyn CatalogTx,
    lookup: &ReferenceLookup,
    product: &Product,
) -> Result<ProductResponse, DispatchError> {
    let data = product.data();
    let attributes = match data.attributes_data_id {
        Some(id) => tx.attribute_data(id).await?,
        None => None,
    };

    let base_unit = lookup.unit(Some(data.base_unit_id));
    let purchase = lookup.tax_rate(data.purchase_tax_rate_id);
    let sales = lookup.tax_rate(data.sales_tax_rate_id);

    Ok(ProductResponse {
        id: data.id,
        version: product.version(),
        name: data.name.clone(),
        code: data.code.clone(),
        product_type: data.product_type,
        catalog_number: data.catalog_number.clone(),
        pkwiu_code: data.pkwiu_code.clone(),
        cn_code: data.cn_code.clone(),
        description: data.description.clone(),
        image: data.image.as_ref().map(|image| ImageResponse {
            file_name: image.file_name.clone(),
            content: BASE64.encode(&image.content),
        }),
        warehousing_strategy: data.warehousing_strategy,
        category_id: data.category_id,
        category_name: data
            .category_id
            .and_then(|id| lookup.categories.get(&id))
            .map(|c| c.name.clone()),
        base_unit_id: data.base_unit_id,
        base_unit_name: base_unit.map(|u| u.name.clone()),
        base_unit_symbol: base_unit.map(|u| u.symbol.clone()),
        base_unit_is_weighted: base_unit.is_some_and(|u| u.is_weighted),
        weight_unit_id: data.weight_unit_id,
        weight_unit_name: lookup.unit(data.weight_unit_id).map(|u| u.name.clone()),
        size_unit_id: data.size_unit_id,
        size_unit_name: lookup.unit(data.size_unit_id).map(|u| u.name.clone()),
        alternative_units: data
            .alternative_units
            .iter()
            .map(|a| AlternativeUnitResponse {
                id: a.id,
                target_unit_id: a.target_unit_id,
                target_unit_symbol: lookup.unit(Some(a.target_unit_id)).map(|u| u.symbol.clone()),
                conversion_ratio: a.conversion_ratio,
            })
            .collect(),
        number_generator_template_id: data.number_generator_template_id,
        number_generator_template_name: data
            .number_generator_template_id
            .and_then(|id| lookup.templates.get(&id).cloned()),
        quantity_input_modes: data.quantity_input_modes,
        has_weight: data.has_weight,
        weight_input_modes: data.weight_input_modes,
        has_size: data.has_size,
        size_input_modes: data.size_input_modes,
        net_weight: data.net_weight,
        tare: data.tare,
        width: data.width,
        height: data.height,
        depth: data.depth,
        quantity_step: data.quantity_step,
        default_quantity: data.default_quantity,
        default_use_by_days: data.default_use_by_days,
        default_freeze_days: data.default_freeze_days,
        is_freezable: data.is_freezable,
        is_perishable: data.is_perishable,
        min_weight: data.min_weight,
        max_weight: data.max_weight,
        min_storage_temperature: data.min_storage_temperature,
        max_storage_temperature: data.max_storage_temperature,
        purchase_tax_rate_id: data.purchase_tax_rate_id,
        purchase_tax_rate_name: purchase.map(|t| t.name.clone()),
        purchase_tax_rate_value: purchase.map(|t| t.value),
        sales_tax_rate_id: data.sales_tax_rate_id,
        sales_tax_rate_name: sales.map(|t| t.name.clone()),
        sales_tax_rate_value: sales.map(|t| t.value),
        prices: data.prices.clone(),
        attributes_data_model_id: attributes.as_ref().map(|a| a.model_id),
        attributes: attributes.map(|a| a.values),
        handling_unit_item_data_model_id: data.handling_unit_item_data_model_id,
        attributes_use_case: None,
        created_at: data.created_at,
        last_modified: data.last_modified,
    })
}

async fn list(tx: &mut dyn CatalogTx, selection: &ProductSelection) -> Result<Vec<ProductResponse>, DispatchError> {
    let products = tx.products(selection).await?;
    let lookup = ReferenceLookup::load(tx).await?;

    let mut responses = Vec::with_capacity(products.len());
    for product in &products {
        responses.push(product_response(tx, &lookup, product).await?);
    }
    Ok(responses)
}

/// Single-product response, including the attribute use case of its type.
pub async fn single(tx: &mut dyn CatalogTx, product: &Product) -> Result<ProductResponse, DispatchError> {
    let lookup = ReferenceLookup::load(tx).await?;
    let mut response = product_response(tx, &lookup, product).await?;
    response.attributes_use_case = Some(product.data().product_type.attributes_use_case().to_string());
    Ok(response)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetAllProducts;

#[async_trait]
impl CatalogQuery for GetAllProducts {
    type Output = Vec<ProductResponse>;
    const NAME: &'static str = "products.get_all";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<Self::Output, DispatchError> {
        list(tx, &ProductSelection::All).await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetManyProducts {
    #[serde(default)]
    pub ids: Vec<ProductId>,
}

#[async_trait]
impl CatalogQuery for GetManyProducts {
    type Output = Vec<ProductResponse>;
    const NAME: &'static str = "products.get_many";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<Self::Output, DispatchError> {
        list(tx, &ProductSelection::Ids(self.ids.clone())).await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetManyProductsByCodes {
    #[serde(default)]
    pub codes: Vec<String>,
}

#[async_trait]
impl CatalogQuery for GetManyProductsByCodes {
    type Output = Vec<ProductResponse>;
    const NAME: &'static str = "products.get_many_by_codes";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<Self::Output, DispatchError> {
        list(tx, &ProductSelection::Codes(self.codes.clone())).await
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetProductById {
    pub id: ProductId,
}

#[async_trait]
impl CatalogQuery for GetProductById {
    type Output = ProductResponse;
    const NAME: &'static str = "products.get_by_id";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<Self::Output, DispatchError> {
        let product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        single(tx, &product).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProductByCode {
    pub code: String,
}

#[async_trait]
impl CatalogQuery for GetProductByCode {
    type Output = ProductResponse;
    const NAME: &'static str = "products.get_by_code";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<Self::Output, DispatchError> {
        let product = tx
            .product_by_code(self.code.trim())
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product with code {}", self.code)))?;
        single(tx, &product).await
    }
}
