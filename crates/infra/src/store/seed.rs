//! Built-in reference rows.
//!
//! The in-memory store starts from [`reference_data`]; the Postgres migration
//! migrations `0002_reference_data.sql` and `0003_handling_unit_item_model.sql`
//! insert the same rows with the same ids.

use uuid::Uuid;

use catalog_products::{
    AttributeModel, AttributeModelId, CategoryId, NumberGeneratorTemplate, PriceList, PriceListId, ProductCategory,
    ProductType, TaxRate, TaxRateId, TemplateId, Unit, UnitId,
};

pub const PIECE: UnitId = UnitId::from_uuid(Uuid::from_u128(0x101));
pub const KILOGRAM: UnitId = UnitId::from_uuid(Uuid::from_u128(0x102));
pub const GRAM: UnitId = UnitId::from_uuid(Uuid::from_u128(0x103));
pub const CENTIMETRE: UnitId = UnitId::from_uuid(Uuid::from_u128(0x104));
pub const BOX: UnitId = UnitId::from_uuid(Uuid::from_u128(0x105));
pub const LITRE: UnitId = UnitId::from_uuid(Uuid::from_u128(0x106));

pub const GENERAL: CategoryId = CategoryId::from_uuid(Uuid::from_u128(0x201));
pub const FOOD: CategoryId = CategoryId::from_uuid(Uuid::from_u128(0x202));

pub const VAT_23: TaxRateId = TaxRateId::from_uuid(Uuid::from_u128(0x301));
pub const VAT_8: TaxRateId = TaxRateId::from_uuid(Uuid::from_u128(0x302));
pub const VAT_0: TaxRateId = TaxRateId::from_uuid(Uuid::from_u128(0x303));

pub const PRODUCT_CODE_TEMPLATE: TemplateId = TemplateId::from_uuid(Uuid::from_u128(0x401));
pub const BATCH_TEMPLATE: TemplateId = TemplateId::from_uuid(Uuid::from_u128(0x402));

pub const RETAIL: PriceListId = PriceListId::from_uuid(Uuid::from_u128(0x501));
pub const WHOLESALE: PriceListId = PriceListId::from_uuid(Uuid::from_u128(0x502));

pub const HANDLING_UNIT_ITEM_MODEL: AttributeModelId = AttributeModelId::from_uuid(Uuid::from_u128(0x605));

#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub units: Vec<Unit>,
    pub categories: Vec<ProductCategory>,
    pub tax_rates: Vec<TaxRate>,
    pub templates: Vec<NumberGeneratorTemplate>,
    pub price_lists: Vec<PriceList>,
    pub attribute_models: Vec<AttributeModel>,
}

fn unit(id: UnitId, name: &str, symbol: &str, is_weighted: bool) -> Unit {
    Unit {
        id,
        name: name.to_string(),
        symbol: symbol.to_string(),
        is_weighted,
    }
}

pub fn attribute_model_id(product_type: ProductType) -> AttributeModelId {
    let n = match product_type {
        ProductType::Good => 0x601,
        ProductType::Service => 0x602,
        ProductType::Container => 0x603,
        ProductType::Compound => 0x604,
    };
    AttributeModelId::from_uuid(Uuid::from_u128(n))
}

pub fn reference_data() -> ReferenceData {
    ReferenceData {
        units: vec![
            unit(PIECE, "Piece", "pcs", false),
            unit(KILOGRAM, "Kilogram", "kg", true),
            unit(GRAM, "Gram", "g", true),
            unit(CENTIMETRE, "Centimetre", "cm", false),
            unit(BOX, "Box", "box", false),
            unit(LITRE, "Litre", "l", false),
        ],
        categories: vec![
            ProductCategory { id: GENERAL, name: "General".to_string() },
            ProductCategory { id: FOOD, name: "Food".to_string() },
        ],
        tax_rates: vec![
            TaxRate { id: VAT_23, name: "VAT 23%".to_string(), value: 23 },
            TaxRate { id: VAT_8, name: "VAT 8%".to_string(), value: 8 },
            TaxRate { id: VAT_0, name: "VAT 0%".to_string(), value: 0 },
        ],
        templates: vec![
            NumberGeneratorTemplate {
                id: PRODUCT_CODE_TEMPLATE,
                name: "Product code".to_string(),
                template: "PRD/{seq:5}".to_string(),
            },
            NumberGeneratorTemplate {
                id: BATCH_TEMPLATE,
                name: "Batch number".to_string(),
                template: "B/{yyyy}/{seq:4}".to_string(),
            },
        ],
        price_lists: vec![
            PriceList { id: RETAIL, name: "Retail".to_string(), currency: "PLN".to_string() },
            PriceList { id: WHOLESALE, name: "Wholesale".to_string(), currency: "PLN".to_string() },
        ],
        attribute_models: ProductType::ALL
            .into_iter()
            .map(|t| AttributeModel {
                id: attribute_model_id(t),
                name: format!("{} attributes", t.as_str()),
                use_case: t.attributes_use_case().to_string(),
            })
            .chain([AttributeModel {
                id: HANDLING_UNIT_ITEM_MODEL,
                name: "handling unit item attributes".to_string(),
                use_case: "HandlingUnit.Item.Attributes".to_string(),
            }])
            .collect(),
    }
}
