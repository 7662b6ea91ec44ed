//! Product catalog domain.
//!
//! Business rules for products, implemented as deterministic domain logic
//! (no IO, no HTTP, no storage). Reference data (units, tax rates, price
//! lists, ...) is owned elsewhere and only read here.

pub mod alternative_unit;
pub mod input_modes;
pub mod price;
pub mod product;
pub mod reference;

pub use alternative_unit::{AlternativeUnitId, ProductAlternativeUnit};
pub use input_modes::{InputMode, InputModes, QuantityInputMode, SizeInputMode, WeightInputMode};
pub use price::ProductPrice;
pub use product::{
    DEFAULT_QUANTITY_STEP, MAX_CODE_LENGTH, NewProduct, Product, ProductAlternativeUnitsChanged, ProductCodeChanged,
    ProductCreated, ProductData, ProductDeleted, ProductEvent, ProductId, ProductImage, ProductNameChanged,
    ProductPricesChanged, ProductType, ProductWarehousingStrategyChanged, SAME_AS_BASE_UNIT, WarehousingStrategy,
};
pub use reference::{
    AttributeData, AttributeDataId, AttributeModel, AttributeModelId, CategoryId, NumberGeneratorTemplate,
    PluVariant, PluVariantId, PriceList, PriceListId, ProductCategory, TaxRate, TaxRateId, TemplateId, Unit,
    UnitId,
};
