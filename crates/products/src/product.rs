use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalog_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Measure, guard, reconcile,
};
use catalog_events::Event;

use crate::alternative_unit::ProductAlternativeUnit;
use crate::input_modes::{InputModes, QuantityInputMode, SizeInputMode, WeightInputMode};
use crate::price::ProductPrice;
use crate::reference::{AttributeDataId, AttributeModelId, CategoryId, TaxRateId, TemplateId, Unit, UnitId};

pub const MAX_CODE_LENGTH: usize = 255;
pub const DEFAULT_QUANTITY_STEP: f64 = 0.001;

pub const SAME_AS_BASE_UNIT: &str = "Additional unit cannot be the same as base.";

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new() -> Self {
        Self(AggregateId::new())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(AggregateId::from_uuid(uuid))
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        self.0.as_uuid()
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for ProductId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<ProductId> for AggregateId {
    fn from(value: ProductId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Good,
    Service,
    Container,
    Compound,
}

impl ProductType {
    pub const ALL: [ProductType; 4] = [Self::Good, Self::Service, Self::Container, Self::Compound];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Service => "service",
            Self::Container => "container",
            Self::Compound => "compound",
        }
    }

    /// Use case under which the attribute model for this type is registered.
    pub fn attributes_use_case(self) -> &'static str {
        match self {
            Self::Good => "Product.Good.Attributes",
            Self::Service => "Product.Service.Attributes",
            Self::Container => "Product.Container.Attributes",
            Self::Compound => "Product.Compound.Attributes",
        }
    }
}

impl core::str::FromStr for ProductType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown product type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehousingStrategy {
    #[default]
    Fifo,
    Lifo,
    /// First expired, first out.
    Fefo,
}

impl WarehousingStrategy {
    pub const ALL: [WarehousingStrategy; 3] = [Self::Fifo, Self::Lifo, Self::Fefo];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Lifo => "lifo",
            Self::Fefo => "fefo",
        }
    }
}

impl core::str::FromStr for WarehousingStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::validation(format!("unknown warehousing strategy: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductImage {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Full persisted state of a product.
///
/// Readable by anyone through [`Product::data`]; writable only through the
/// mutators on [`Product`] (or by the store when rehydrating).
#[derive(Debug, Clone, PartialEq)]
pub struct ProductData {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub product_type: ProductType,
    pub category_id: Option<CategoryId>,
    pub base_unit_id: UnitId,
    pub weight_unit_id: Option<UnitId>,
    pub size_unit_id: Option<UnitId>,
    pub warehousing_strategy: WarehousingStrategy,
    pub image: Option<ProductImage>,
    pub description: Option<String>,
    pub catalog_number: Option<String>,
    pub pkwiu_code: Option<String>,
    pub cn_code: Option<String>,
    pub alternative_units: Vec<ProductAlternativeUnit>,
    pub prices: Vec<ProductPrice>,
    pub number_generator_template_id: Option<TemplateId>,
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
    pub default_use_by_days: i32,
    pub default_freeze_days: i32,
    pub quantity_step: f64,
    pub default_quantity: Measure,
    pub is_freezable: bool,
    pub is_perishable: bool,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub min_storage_temperature: Option<f64>,
    pub max_storage_temperature: Option<f64>,
    pub purchase_tax_rate_id: TaxRateId,
    pub sales_tax_rate_id: TaxRateId,
    pub attributes_data_id: Option<AttributeDataId>,
    /// Model describing the data kept for this product on handling-unit items.
    pub handling_unit_item_data_model_id: Option<AttributeModelId>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// Mandatory fields of a new product.
#[derive(Debug, Clone)]
pub struct NewProduct<'a> {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub product_type: ProductType,
    pub base_unit: &'a Unit,
    pub purchase_tax_rate_id: TaxRateId,
    pub sales_tax_rate_id: TaxRateId,
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub code: String,
    pub product_type: ProductType,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductNameChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductNameChanged {
    pub product_id: ProductId,
    pub old_name: String,
    pub new_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductCodeChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCodeChanged {
    pub product_id: ProductId,
    pub old_code: String,
    pub new_code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductWarehousingStrategyChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductWarehousingStrategyChanged {
    pub product_id: ProductId,
    pub old_strategy: WarehousingStrategy,
    pub new_strategy: WarehousingStrategy,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductAlternativeUnitsChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAlternativeUnitsChanged {
    pub product_id: ProductId,
    pub alternative_units: Vec<ProductAlternativeUnit>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductPricesChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPricesChanged {
    pub product_id: ProductId,
    pub prices: Vec<ProductPrice>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductNameChanged(ProductNameChanged),
    ProductCodeChanged(ProductCodeChanged),
    ProductWarehousingStrategyChanged(ProductWarehousingStrategyChanged),
    ProductAlternativeUnitsChanged(ProductAlternativeUnitsChanged),
    ProductPricesChanged(ProductPricesChanged),
    ProductDeleted(ProductDeleted),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductNameChanged(_) => "products.product.name_changed",
            ProductEvent::ProductCodeChanged(_) => "products.product.code_changed",
            ProductEvent::ProductWarehousingStrategyChanged(_) => "products.product.warehousing_strategy_changed",
            ProductEvent::ProductAlternativeUnitsChanged(_) => "products.product.alternative_units_changed",
            ProductEvent::ProductPricesChanged(_) => "products.product.prices_changed",
            ProductEvent::ProductDeleted(_) => "products.product.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductNameChanged(e) => e.occurred_at,
            ProductEvent::ProductCodeChanged(e) => e.occurred_at,
            ProductEvent::ProductWarehousingStrategyChanged(e) => e.occurred_at,
            ProductEvent::ProductAlternativeUnitsChanged(e) => e.occurred_at,
            ProductEvent::ProductPricesChanged(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
        }
    }
}

/// Aggregate root: Product.
///
/// Every mutator enforces one invariant and leaves the state untouched when
/// it fails. Observable changes are recorded as [`ProductEvent`]s until the
/// application layer drains them with [`Aggregate::take_events`].
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    data: ProductData,
    version: u64,
    changed_at: DateTime<Utc>,
    events: Vec<ProductEvent>,
}

impl Product {
    pub fn create(new: NewProduct<'_>, at: DateTime<Utc>) -> DomainResult<Self> {
        guard::not_blank(&new.name, "name")?;
        check_code(&new.code)?;

        let data = ProductData {
            id: new.id,
            name: new.name,
            code: new.code,
            product_type: new.product_type,
            category_id: None,
            base_unit_id: new.base_unit.id,
            weight_unit_id: None,
            size_unit_id: None,
            warehousing_strategy: WarehousingStrategy::default(),
            image: None,
            description: None,
            catalog_number: None,
            pkwiu_code: None,
            cn_code: None,
            alternative_units: Vec::new(),
            prices: Vec::new(),
            number_generator_template_id: None,
            quantity_input_modes: InputModes::empty(),
            has_weight: false,
            weight_input_modes: InputModes::empty(),
            has_size: false,
            size_input_modes: InputModes::empty(),
            net_weight: Measure::ZERO,
            tare: Measure::ZERO,
            width: Measure::ZERO,
            height: Measure::ZERO,
            depth: Measure::ZERO,
            default_use_by_days: 0,
            default_freeze_days: 0,
            quantity_step: DEFAULT_QUANTITY_STEP,
            default_quantity: Measure::ZERO,
            is_freezable: false,
            is_perishable: true,
            min_weight: None,
            max_weight: None,
            min_storage_temperature: None,
            max_storage_temperature: None,
            purchase_tax_rate_id: new.purchase_tax_rate_id,
            sales_tax_rate_id: new.sales_tax_rate_id,
            attributes_data_id: None,
            handling_unit_item_data_model_id: None,
            created_at: at,
            last_modified: at,
        };

        let mut product = Self {
            data,
            version: 0,
            changed_at: at,
            events: Vec::new(),
        };
        product.record(|p, at| {
            ProductEvent::ProductCreated(ProductCreated {
                product_id: p.data.id,
                name: p.data.name.clone(),
                code: p.data.code.clone(),
                product_type: p.data.product_type,
                occurred_at: at,
            })
        });
        Ok(product)
    }

    /// Rebuild a product from persisted state. No events are recorded.
    pub fn rehydrate(data: ProductData, version: u64) -> Self {
        Self {
            changed_at: data.last_modified,
            data,
            version,
            events: Vec::new(),
        }
    }

    pub fn data(&self) -> &ProductData {
        &self.data
    }

    pub fn into_data(self) -> ProductData {
        self.data
    }

    pub fn id_typed(&self) -> ProductId {
        self.data.id
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn code(&self) -> &str {
        &self.data.code
    }

    pub fn base_unit_id(&self) -> UnitId {
        self.data.base_unit_id
    }

    pub fn alternative_units(&self) -> &[ProductAlternativeUnit] {
        &self.data.alternative_units
    }

    pub fn prices(&self) -> &[ProductPrice] {
        &self.data.prices
    }

    /// Start a change set: subsequent events carry `at`, and the product is
    /// marked as modified at `at`.
    pub fn begin_change(&mut self, at: DateTime<Utc>) {
        self.changed_at = at;
        self.data.last_modified = at;
    }

    /// Called by the store once the current state has been written.
    pub fn mark_saved(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn mark_deleted(&mut self) {
        self.record(|p, at| {
            ProductEvent::ProductDeleted(ProductDeleted {
                product_id: p.data.id,
                code: p.data.code.clone(),
                occurred_at: at,
            })
        });
    }

    pub fn change_name(&mut self, name: impl Into<String>) -> DomainResult<()> {
        let name = name.into();
        guard::not_blank(&name, "name")?;
        if name == self.data.name {
            return Ok(());
        }

        let old_name = core::mem::replace(&mut self.data.name, name);
        self.record(|p, at| {
            ProductEvent::ProductNameChanged(ProductNameChanged {
                product_id: p.data.id,
                old_name,
                new_name: p.data.name.clone(),
                occurred_at: at,
            })
        });
        Ok(())
    }

    /// Uniqueness across the catalog is checked by the caller.
    pub fn change_code(&mut self, code: impl Into<String>) -> DomainResult<()> {
        let code = code.into();
        check_code(&code)?;
        if code == self.data.code {
            return Ok(());
        }

        let old_code = core::mem::replace(&mut self.data.code, code);
        self.record(|p, at| {
            ProductEvent::ProductCodeChanged(ProductCodeChanged {
                product_id: p.data.id,
                old_code,
                new_code: p.data.code.clone(),
                occurred_at: at,
            })
        });
        Ok(())
    }

    pub fn set_product_type(&mut self, product_type: ProductType) {
        self.data.product_type = product_type;
    }

    pub fn set_category(&mut self, category_id: Option<CategoryId>) {
        self.data.category_id = category_id;
    }

    /// Change the base unit together with the alternative units, since the
    /// two must never share a unit.
    ///
    /// Quantity and weight input modes are re-normalised against the new
    /// base unit.
    pub fn change_units(
        &mut self,
        base_unit: &Unit,
        alternative_units: Vec<ProductAlternativeUnit>,
    ) -> DomainResult<()> {
        check_alternative_units(&alternative_units, base_unit.id)?;

        self.data.base_unit_id = base_unit.id;
        self.data.quantity_input_modes = normalize_quantity_modes(self.data.quantity_input_modes, base_unit);
        self.data.weight_input_modes = normalize_weight_modes(self.data.weight_input_modes, base_unit);
        self.update_alternative_units(alternative_units)
    }

    /// Reconcile alternative units by id: matched entries are updated, new
    /// ones added, missing ones removed.
    pub fn update_alternative_units(&mut self, alternative_units: Vec<ProductAlternativeUnit>) -> DomainResult<()> {
        check_alternative_units(&alternative_units, self.data.base_unit_id)?;

        let changed = reconcile(&mut self.data.alternative_units, alternative_units, |existing, incoming| {
            existing.update_from(incoming)
        });
        if changed {
            self.record(|p, at| {
                ProductEvent::ProductAlternativeUnitsChanged(ProductAlternativeUnitsChanged {
                    product_id: p.data.id,
                    alternative_units: p.data.alternative_units.clone(),
                    occurred_at: at,
                })
            });
        }
        Ok(())
    }

    pub fn set_weight_unit(&mut self, unit: Option<&Unit>) -> DomainResult<()> {
        if let Some(unit) = unit {
            guard::verify(unit.is_weighted, "weight_unit_id", "Weight unit must be a weighted unit.")?;
        }
        self.data.weight_unit_id = unit.map(|u| u.id);
        Ok(())
    }

    pub fn set_size_unit(&mut self, unit: Option<&Unit>) -> DomainResult<()> {
        if let Some(unit) = unit {
            guard::verify(!unit.is_weighted, "size_unit_id", "Size unit cannot be a weighted unit.")?;
        }
        self.data.size_unit_id = unit.map(|u| u.id);
        Ok(())
    }

    pub fn set_warehousing_strategy(&mut self, strategy: WarehousingStrategy) {
        if strategy == self.data.warehousing_strategy {
            return;
        }

        let old_strategy = core::mem::replace(&mut self.data.warehousing_strategy, strategy);
        self.record(|p, at| {
            ProductEvent::ProductWarehousingStrategyChanged(ProductWarehousingStrategyChanged {
                product_id: p.data.id,
                old_strategy,
                new_strategy: p.data.warehousing_strategy,
                occurred_at: at,
            })
        });
    }

    pub fn set_image(&mut self, image: Option<ProductImage>) -> DomainResult<()> {
        if let Some(image) = &image {
            guard::not_blank(&image.file_name, "image.file_name")?;
        }
        self.data.image = image;
        Ok(())
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.data.description = description;
    }

    pub fn set_catalog_codes(
        &mut self,
        catalog_number: Option<String>,
        pkwiu_code: Option<String>,
        cn_code: Option<String>,
    ) -> DomainResult<()> {
        for (field, value) in [
            ("catalog_number", &catalog_number),
            ("pkwiu_code", &pkwiu_code),
            ("cn_code", &cn_code),
        ] {
            if let Some(value) = value {
                guard::verify(value.chars().count() <= MAX_CODE_LENGTH, field, "must be 255 characters or fewer")?;
            }
        }
        self.data.catalog_number = catalog_number;
        self.data.pkwiu_code = pkwiu_code;
        self.data.cn_code = cn_code;
        Ok(())
    }

    pub fn set_number_generator_template(&mut self, template_id: Option<TemplateId>) {
        self.data.number_generator_template_id = template_id;
    }

    /// Scale input requires a weighted base unit; it is dropped otherwise.
    pub fn set_quantity_input_modes(
        &mut self,
        modes: InputModes<QuantityInputMode>,
        base_unit: &Unit,
    ) -> DomainResult<()> {
        self.ensure_base_unit(base_unit)?;
        self.data.quantity_input_modes = normalize_quantity_modes(modes, base_unit);
        Ok(())
    }

    /// Deriving weight from quantity is meaningless for a weighted base unit;
    /// that mode is dropped then.
    pub fn set_weight_input_modes(
        &mut self,
        has_weight: bool,
        modes: InputModes<WeightInputMode>,
        base_unit: &Unit,
    ) -> DomainResult<()> {
        self.ensure_base_unit(base_unit)?;
        self.data.has_weight = has_weight;
        self.data.weight_input_modes = normalize_weight_modes(modes, base_unit);
        Ok(())
    }

    pub fn set_size_input_modes(&mut self, has_size: bool, modes: InputModes<SizeInputMode>) {
        self.data.has_size = has_size;
        self.data.size_input_modes = modes;
    }

    pub fn change_weight(&mut self, net_weight: Measure, tare: Measure) -> DomainResult<()> {
        guard::non_negative(net_weight, "net_weight")?;
        guard::non_negative(tare, "tare")?;
        self.data.net_weight = net_weight;
        self.data.tare = tare;
        Ok(())
    }

    pub fn change_size(&mut self, width: Measure, height: Measure, depth: Measure) -> DomainResult<()> {
        guard::non_negative(width, "width")?;
        guard::non_negative(height, "height")?;
        guard::non_negative(depth, "depth")?;
        self.data.width = width;
        self.data.height = height;
        self.data.depth = depth;
        Ok(())
    }

    pub fn set_weight_limits(&mut self, min_weight: Option<f64>, max_weight: Option<f64>) -> DomainResult<()> {
        guard::non_negative_opt(min_weight, "min_weight")?;
        guard::non_negative_opt(max_weight, "max_weight")?;
        guard::ordered(min_weight, max_weight, "max_weight")?;
        self.data.min_weight = min_weight;
        self.data.max_weight = max_weight;
        Ok(())
    }

    pub fn set_storage_temperatures(&mut self, min: Option<f64>, max: Option<f64>) -> DomainResult<()> {
        guard::ordered(min, max, "max_storage_temperature")?;
        self.data.min_storage_temperature = min;
        self.data.max_storage_temperature = max;
        Ok(())
    }

    pub fn set_quantity_step(&mut self, step: f64) -> DomainResult<()> {
        guard::non_negative(step, "quantity_step")?;
        self.data.quantity_step = step;
        Ok(())
    }

    pub fn set_default_quantity(&mut self, quantity: Measure) -> DomainResult<()> {
        guard::non_negative(quantity, "default_quantity")?;
        self.data.default_quantity = quantity;
        Ok(())
    }

    /// Date offsets applied when stock is received.
    pub fn set_shelf_life(&mut self, default_use_by_days: i32, default_freeze_days: i32) -> DomainResult<()> {
        guard::non_negative(default_use_by_days, "default_use_by_days")?;
        guard::non_negative(default_freeze_days, "default_freeze_days")?;
        self.data.default_use_by_days = default_use_by_days;
        self.data.default_freeze_days = default_freeze_days;
        Ok(())
    }

    pub fn set_storage_flags(&mut self, is_freezable: bool, is_perishable: bool) {
        self.data.is_freezable = is_freezable;
        self.data.is_perishable = is_perishable;
    }

    pub fn set_tax_rates(&mut self, purchase_tax_rate_id: TaxRateId, sales_tax_rate_id: TaxRateId) {
        self.data.purchase_tax_rate_id = purchase_tax_rate_id;
        self.data.sales_tax_rate_id = sales_tax_rate_id;
    }

    pub fn set_attributes_data(&mut self, attributes_data_id: Option<AttributeDataId>) {
        self.data.attributes_data_id = attributes_data_id;
    }

    pub fn set_handling_unit_item_data_model(&mut self, model_id: Option<AttributeModelId>) {
        self.data.handling_unit_item_data_model_id = model_id;
    }

    /// Reconcile price-list entries by price list.
    pub fn update_prices(&mut self, prices: Vec<ProductPrice>) -> DomainResult<()> {
        for (i, price) in prices.iter().enumerate() {
            guard::non_negative(price.net_price, &format!("prices[{i}].net_price"))?;
            let repeated = prices[..i].iter().any(|p| p.price_list_id == price.price_list_id);
            guard::verify(!repeated, &format!("prices[{i}].price_list_id"), "must be unique")?;
        }

        let changed = reconcile(&mut self.data.prices, prices, |existing, incoming| {
            existing.update_from(incoming)
        });
        if changed {
            self.record(|p, at| {
                ProductEvent::ProductPricesChanged(ProductPricesChanged {
                    product_id: p.data.id,
                    prices: p.data.prices.clone(),
                    occurred_at: at,
                })
            });
        }
        Ok(())
    }

    fn ensure_base_unit(&self, unit: &Unit) -> DomainResult<()> {
        if unit.id != self.data.base_unit_id {
            return Err(DomainError::invariant("unit passed for input modes is not the product's base unit"));
        }
        Ok(())
    }

    fn record(&mut self, make: impl FnOnce(&Self, DateTime<Utc>) -> ProductEvent) {
        let event = make(self, self.changed_at);
        self.events.push(event);
    }
}

fn check_code(code: &str) -> DomainResult<()> {
    guard::not_blank(code, "code")?;
    guard::verify(
        code.chars().count() <= MAX_CODE_LENGTH,
        "code",
        "must be 255 characters or fewer",
    )
}

fn check_alternative_units(units: &[ProductAlternativeUnit], base_unit_id: UnitId) -> DomainResult<()> {
    for (i, unit) in units.iter().enumerate() {
        guard::verify(
            unit.target_unit_id != base_unit_id,
            &format!("alternative_units[{i}].target_unit_id"),
            SAME_AS_BASE_UNIT,
        )?;
        let repeated = units[..i].iter().any(|u| u.target_unit_id == unit.target_unit_id);
        guard::verify(!repeated, &format!("alternative_units[{i}].target_unit_id"), "must be unique")?;
        let repeated_id = units[..i].iter().any(|u| u.id == unit.id);
        guard::verify(!repeated_id, &format!("alternative_units[{i}].id"), "must be unique")?;
        guard::verify(
            unit.conversion_ratio > Measure::ZERO,
            &format!("alternative_units[{i}].conversion_ratio"),
            "must be greater than 0",
        )?;
    }
    Ok(())
}

fn normalize_quantity_modes(modes: InputModes<QuantityInputMode>, base_unit: &Unit) -> InputModes<QuantityInputMode> {
    if base_unit.is_weighted {
        modes
    } else {
        modes.without(QuantityInputMode::FromScale)
    }
}

fn normalize_weight_modes(modes: InputModes<WeightInputMode>, base_unit: &Unit) -> InputModes<WeightInputMode> {
    if base_unit.is_weighted {
        modes.without(WeightInputMode::FromQuantity)
    } else {
        modes
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.data.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for Product {
    type Event = ProductEvent;

    fn pending_events(&self) -> &[Self::Event] {
        &self.events
    }

    fn take_events(&mut self) -> Vec<Self::Event> {
        core::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alternative_unit::AlternativeUnitId;
    use crate::reference::PriceListId;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn pieces() -> Unit {
        Unit {
            id: UnitId::new(),
            name: "Piece".to_string(),
            symbol: "pcs".to_string(),
            is_weighted: false,
        }
    }

    fn kilograms() -> Unit {
        Unit {
            id: UnitId::new(),
            name: "Kilogram".to_string(),
            symbol: "kg".to_string(),
            is_weighted: true,
        }
    }

    fn create_with(base_unit: &Unit) -> Product {
        Product::create(
            NewProduct {
                id: ProductId::new(),
                name: "Test Product".to_string(),
                code: "P-001".to_string(),
                product_type: ProductType::Good,
                base_unit,
                purchase_tax_rate_id: TaxRateId::new(),
                sales_tax_rate_id: TaxRateId::new(),
            },
            test_time(),
        )
        .unwrap()
    }

    fn created_product() -> Product {
        let mut product = create_with(&pieces());
        product.take_events();
        product
    }

    #[test]
    fn create_records_product_created_with_defaults() {
        let base = pieces();
        let product = create_with(&base);

        assert_eq!(product.version(), 0);
        assert_eq!(product.base_unit_id(), base.id);
        assert_eq!(product.data().warehousing_strategy, WarehousingStrategy::Fifo);
        assert_eq!(product.data().quantity_step, DEFAULT_QUANTITY_STEP);
        assert!(product.data().is_perishable);
        assert!(!product.data().is_freezable);

        assert_eq!(product.pending_events().len(), 1);
        match &product.pending_events()[0] {
            ProductEvent::ProductCreated(e) => {
                assert_eq!(e.product_id, product.id_typed());
                assert_eq!(e.name, "Test Product");
                assert_eq!(e.code, "P-001");
            }
            other => panic!("Expected ProductCreated event, got {other:?}"),
        }
    }

    #[test]
    fn create_rejects_blank_name() {
        let base = pieces();
        let err = Product::create(
            NewProduct {
                id: ProductId::new(),
                name: "   ".to_string(),
                code: "P-001".to_string(),
                product_type: ProductType::Good,
                base_unit: &base,
                purchase_tax_rate_id: TaxRateId::new(),
                sales_tax_rate_id: TaxRateId::new(),
            },
            test_time(),
        )
        .unwrap_err();

        assert!(matches!(err, DomainError::InvalidValue { field, .. } if field == "name"));
    }

    #[test]
    fn change_code_rejects_overlong_code() {
        let mut product = created_product();
        let err = product.change_code("x".repeat(256)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidValue { field, .. } if field == "code"));
        assert_eq!(product.code(), "P-001");
    }

    #[test]
    fn renaming_records_event_only_on_change() {
        let mut product = created_product();

        product.change_name("Test Product").unwrap();
        assert!(!product.has_changes());

        product.change_name("Renamed").unwrap();
        let events = product.take_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductEvent::ProductNameChanged(e) => {
                assert_eq!(e.old_name, "Test Product");
                assert_eq!(e.new_name, "Renamed");
            }
            other => panic!("Expected ProductNameChanged event, got {other:?}"),
        }
        assert!(!product.has_changes());
    }

    #[test]
    fn code_and_strategy_changes_are_recorded() {
        let mut product = created_product();
        product.change_code("P-002").unwrap();
        product.set_warehousing_strategy(WarehousingStrategy::Fefo);
        product.set_warehousing_strategy(WarehousingStrategy::Fefo);

        let types: Vec<_> = product.take_events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            ["products.product.code_changed", "products.product.warehousing_strategy_changed"]
        );
    }

    #[test]
    fn weight_unit_must_be_weighted() {
        let mut product = created_product();

        let err = product.set_weight_unit(Some(&pieces())).unwrap_err();
        assert!(matches!(err, DomainError::InvalidValue { field, .. } if field == "weight_unit_id"));
        assert_eq!(product.data().weight_unit_id, None);

        let kg = kilograms();
        product.set_weight_unit(Some(&kg)).unwrap();
        assert_eq!(product.data().weight_unit_id, Some(kg.id));
    }

    #[test]
    fn size_unit_must_not_be_weighted() {
        let mut product = created_product();
        assert!(product.set_size_unit(Some(&kilograms())).is_err());
        assert!(product.set_size_unit(Some(&pieces())).is_ok());
        assert!(product.set_size_unit(None).is_ok());
        assert_eq!(product.data().size_unit_id, None);
    }

    #[test]
    fn storage_temperatures_must_be_ordered() {
        let mut product = created_product();

        let err = product.set_storage_temperatures(Some(8.0), Some(2.0)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidValue { field, .. } if field == "max_storage_temperature"));

        product.set_storage_temperatures(Some(-18.0), Some(-18.0)).unwrap();
        product.set_storage_temperatures(Some(4.0), None).unwrap();
        assert_eq!(product.data().min_storage_temperature, Some(4.0));
    }

    #[test]
    fn weight_limits_are_non_negative_and_ordered() {
        let mut product = created_product();
        assert!(product.set_weight_limits(Some(-1.0), None).is_err());
        assert!(product.set_weight_limits(Some(5.0), Some(1.0)).is_err());
        assert!(product.set_weight_limits(Some(1.0), Some(5.0)).is_ok());
    }

    #[test]
    fn measures_must_be_non_negative() {
        let mut product = created_product();
        let negative = Measure::from_micros(-1);

        assert!(product.change_weight(negative, Measure::ZERO).is_err());
        assert!(product.change_size(Measure::ZERO, negative, Measure::ZERO).is_err());
        assert!(product.set_default_quantity(negative).is_err());
        assert!(product.set_quantity_step(-0.5).is_err());
        assert!(product.set_shelf_life(-1, 0).is_err());

        product.change_weight(Measure::from_units(2), Measure::ZERO).unwrap();
        assert_eq!(product.data().net_weight, Measure::from_units(2));
    }

    #[test]
    fn scale_quantity_input_requires_weighted_base_unit() {
        let base = pieces();
        let mut product = create_with(&base);
        let modes = InputModes::from([QuantityInputMode::FromScale, QuantityInputMode::FromUserInput]);

        product.set_quantity_input_modes(modes, &base).unwrap();
        assert_eq!(
            product.data().quantity_input_modes,
            InputModes::from([QuantityInputMode::FromUserInput])
        );

        let kg = kilograms();
        let mut weighted = create_with(&kg);
        weighted.set_quantity_input_modes(modes, &kg).unwrap();
        assert_eq!(weighted.data().quantity_input_modes, modes);
    }

    #[test]
    fn weight_from_quantity_is_dropped_for_weighted_base_unit() {
        let kg = kilograms();
        let mut product = create_with(&kg);
        let modes = InputModes::from([WeightInputMode::FromQuantity, WeightInputMode::FromScale]);

        product.set_weight_input_modes(true, modes, &kg).unwrap();
        assert!(product.data().has_weight);
        assert_eq!(product.data().weight_input_modes, InputModes::from([WeightInputMode::FromScale]));
    }

    #[test]
    fn input_modes_require_the_current_base_unit() {
        let mut product = created_product();
        let err = product
            .set_quantity_input_modes(InputModes::empty(), &kilograms())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn changing_base_unit_renormalizes_input_modes() {
        let kg = kilograms();
        let mut product = create_with(&kg);
        product
            .set_quantity_input_modes(InputModes::from([QuantityInputMode::FromScale]), &kg)
            .unwrap();

        product.change_units(&pieces(), Vec::new()).unwrap();
        assert!(product.data().quantity_input_modes.is_empty());
    }

    #[test]
    fn alternative_unit_cannot_target_base_unit() {
        let base = pieces();
        let mut product = create_with(&base);
        let box_unit = UnitId::new();

        let err = product
            .change_units(
                &base,
                vec![
                    ProductAlternativeUnit::new(box_unit, Measure::from_units(12)),
                    ProductAlternativeUnit::new(base.id, Measure::from_units(1)),
                ],
            )
            .unwrap_err();

        assert_eq!(
            err,
            DomainError::invalid_value("alternative_units[1].target_unit_id", SAME_AS_BASE_UNIT)
        );
        assert!(product.alternative_units().is_empty());
    }

    #[test]
    fn alternative_units_need_positive_ratio_and_unique_targets() {
        let mut product = created_product();
        let target = UnitId::new();

        assert!(product
            .update_alternative_units(vec![ProductAlternativeUnit::new(target, Measure::ZERO)])
            .is_err());
        assert!(product
            .update_alternative_units(vec![
                ProductAlternativeUnit::new(target, Measure::from_units(2)),
                ProductAlternativeUnit::new(target, Measure::from_units(3)),
            ])
            .is_err());
    }

    #[test]
    fn alternative_units_reject_repeated_ids() {
        let mut product = created_product();
        let first = ProductAlternativeUnit::new(UnitId::new(), Measure::from_units(10));
        let second = ProductAlternativeUnit {
            id: first.id,
            ..ProductAlternativeUnit::new(UnitId::new(), Measure::from_units(2))
        };

        let err = product.update_alternative_units(vec![first, second]).unwrap_err();
        assert_eq!(err, DomainError::invalid_value("alternative_units[1].id", "must be unique"));
        assert!(product.alternative_units().is_empty());
    }

    #[test]
    fn alternative_units_reconcile_by_id() {
        let mut product = created_product();
        let kept = ProductAlternativeUnit::new(UnitId::new(), Measure::from_units(6));
        let removed = ProductAlternativeUnit::new(UnitId::new(), Measure::from_units(12));
        product
            .update_alternative_units(vec![kept.clone(), removed.clone()])
            .unwrap();
        product.take_events();

        let mut kept_changed = kept.clone();
        kept_changed.conversion_ratio = Measure::from_units(8);
        let added = ProductAlternativeUnit {
            id: AlternativeUnitId::new(),
            target_unit_id: UnitId::new(),
            conversion_ratio: Measure::from_units(24),
        };
        product
            .update_alternative_units(vec![kept_changed.clone(), added.clone()])
            .unwrap();

        assert_eq!(product.alternative_units(), [kept_changed, added].as_slice());
        assert!(!product.alternative_units().iter().any(|u| u.id == removed.id));
        assert_eq!(product.take_events().len(), 1);

        product
            .update_alternative_units(product.alternative_units().to_vec())
            .unwrap();
        assert!(!product.has_changes());
    }

    #[test]
    fn prices_reconcile_by_price_list() {
        let mut product = created_product();
        let retail = PriceListId::new();
        let wholesale = PriceListId::new();

        product
            .update_prices(vec![
                ProductPrice { price_list_id: retail, net_price: Measure::from_units(10) },
                ProductPrice { price_list_id: wholesale, net_price: Measure::from_units(8) },
            ])
            .unwrap();
        product
            .update_prices(vec![ProductPrice { price_list_id: wholesale, net_price: Measure::from_units(7) }])
            .unwrap();

        assert_eq!(product.prices().len(), 1);
        assert_eq!(product.prices()[0].net_price, Measure::from_units(7));
        assert_eq!(product.take_events().len(), 2);
    }

    #[test]
    fn prices_reject_negative_and_duplicate_lists() {
        let mut product = created_product();
        let list = PriceListId::new();

        let err = product
            .update_prices(vec![ProductPrice { price_list_id: list, net_price: Measure::from_micros(-1) }])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidValue { field, .. } if field == "prices[0].net_price"));

        let err = product
            .update_prices(vec![
                ProductPrice { price_list_id: list, net_price: Measure::ZERO },
                ProductPrice { price_list_id: list, net_price: Measure::ZERO },
            ])
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidValue { field, .. } if field == "prices[1].price_list_id"));
    }

    #[test]
    fn events_carry_change_set_time() {
        let mut product = created_product();
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap().with_timezone(&Utc);

        product.begin_change(at);
        product.change_name("Later").unwrap();

        assert_eq!(product.data().last_modified, at);
        assert_eq!(product.pending_events()[0].occurred_at(), at);
    }

    #[test]
    fn version_increments_once_per_save() {
        let mut product = created_product();
        product.change_name("A").unwrap();
        product.change_code("B").unwrap();
        assert_eq!(product.version(), 0);
        assert_eq!(product.mark_saved(), 1);
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn rehydrate_restores_state_without_events() {
        let mut product = created_product();
        product.mark_saved();
        let restored = Product::rehydrate(product.data().clone(), product.version());

        assert_eq!(restored.data(), product.data());
        assert_eq!(restored.version(), 1);
        assert!(!restored.has_changes());
    }

    #[test]
    fn delete_records_product_deleted() {
        let mut product = created_product();
        product.mark_deleted();
        assert!(matches!(product.take_events().as_slice(), [ProductEvent::ProductDeleted(e)] if e.code == "P-001"));
    }

    #[test]
    fn product_type_maps_to_attribute_use_case() {
        assert_eq!(ProductType::Good.attributes_use_case(), "Product.Good.Attributes");
        assert_eq!(ProductType::Compound.attributes_use_case(), "Product.Compound.Attributes");
        assert_eq!("Service".parse::<ProductType>().unwrap(), ProductType::Service);
        assert!("gadget".parse::<ProductType>().is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: storage temperatures are accepted exactly when min <= max.
            #[test]
            fn storage_temperature_ordering(min in -80.0f64..80.0, max in -80.0f64..80.0) {
                let mut product = created_product();
                let before = product.clone();

                let result = product.set_storage_temperatures(Some(min), Some(max));

                prop_assert_eq!(result.is_ok(), min <= max);
                if result.is_err() {
                    prop_assert_eq!(product, before);
                }
            }

            /// Property: a rejected mutator leaves the aggregate untouched.
            #[test]
            fn failed_weight_change_is_atomic(
                net in -1_000_000i64..1_000_000,
                tare in -1_000_000i64..1_000_000,
            ) {
                let mut product = created_product();
                let before = product.clone();

                let result = product.change_weight(Measure::from_micros(net), Measure::from_micros(tare));

                prop_assert_eq!(result.is_ok(), net >= 0 && tare >= 0);
                if result.is_err() {
                    prop_assert_eq!(product, before);
                }
            }

            /// Property: quantity modes never keep scale input on a non-weighted base.
            #[test]
            fn quantity_modes_normalized(bits in 0i32..4, weighted in any::<bool>()) {
                let base = if weighted { kilograms() } else { pieces() };
                let mut product = create_with(&base);

                product.set_quantity_input_modes(InputModes::from_bits(bits), &base).unwrap();

                let has_scale = product.data().quantity_input_modes.contains(QuantityInputMode::FromScale);
                prop_assert!(weighted || !has_scale);
            }

            /// Property: reconciling alternative units yields exactly the submitted list.
            #[test]
            fn alternative_units_match_submission(
                first in prop::collection::vec(1i64..100, 0..6),
                second in prop::collection::vec(1i64..100, 0..6),
            ) {
                let mut product = created_product();
                let to_units = |ratios: &[i64]| -> Vec<ProductAlternativeUnit> {
                    ratios
                        .iter()
                        .map(|r| ProductAlternativeUnit::new(UnitId::new(), Measure::from_units(*r)))
                        .collect()
                };

                let initial = to_units(&first);
                product.update_alternative_units(initial.clone()).unwrap();

                // Keep every other initial unit (with a new ratio), append fresh ones.
                let mut next: Vec<_> = initial
                    .iter()
                    .step_by(2)
                    .map(|u| ProductAlternativeUnit {
                        conversion_ratio: Measure::from_units(u.conversion_ratio.micros() / Measure::SCALE + 1),
                        ..u.clone()
                    })
                    .collect();
                next.extend(to_units(&second));

                product.update_alternative_units(next.clone()).unwrap();

                let mut actual: Vec<_> = product.alternative_units().iter().map(|u| u.id).collect();
                let mut expected: Vec<_> = next.iter().map(|u| u.id).collect();
                actual.sort();
                expected.sort();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
