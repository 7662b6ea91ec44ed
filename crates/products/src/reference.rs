//! Reference data read by the catalog.

use serde::{Deserialize, Serialize};

use catalog_core::uuid_id;

uuid_id!(pub struct UnitId, "UnitId");
uuid_id!(pub struct CategoryId, "CategoryId");
uuid_id!(pub struct TaxRateId, "TaxRateId");
uuid_id!(pub struct TemplateId, "TemplateId");
uuid_id!(pub struct PriceListId, "PriceListId");
uuid_id!(pub struct AttributeModelId, "AttributeModelId");
uuid_id!(pub struct AttributeDataId, "AttributeDataId");
uuid_id!(pub struct PluVariantId, "PluVariantId");

/// Unit of measure. Weighted units (kg, g, ...) are the only valid weight
/// units and enable scale input for quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub symbol: String,
    pub is_weighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    pub id: TaxRateId,
    pub name: String,
    /// Percentage, e.g. `23` for 23%.
    pub value: i32,
}

/// Code template such as `PRD/{seq:5}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberGeneratorTemplate {
    pub id: TemplateId,
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub id: PriceListId,
    pub name: String,
    pub currency: String,
}

/// Schema of dynamic attributes, selected by use case
/// (e.g. `Product.Good.Attributes`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeModel {
    pub id: AttributeModelId,
    pub name: String,
    pub use_case: String,
}

/// Attribute values captured for one product against a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeData {
    pub id: AttributeDataId,
    pub model_id: AttributeModelId,
    pub values: serde_json::Value,
}

/// Dependent sub-code of a product; removed together with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluVariant {
    pub id: PluVariantId,
    pub plu_id: crate::ProductId,
    pub code: String,
}
