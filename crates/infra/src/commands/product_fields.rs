//! Fields shared by the add and change commands, with their validation
//! rules and the order in which they are applied to a product.

use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use catalog_core::{Measure, Validator};
use catalog_products::{
    AlternativeUnitId, AttributeData, AttributeDataId, AttributeModelId, CategoryId, DEFAULT_QUANTITY_STEP, InputModes,
    MAX_CODE_LENGTH, Product, ProductAlternativeUnit, ProductImage, QuantityInputMode, SAME_AS_BASE_UNIT,
    SizeInputMode, TaxRateId, TemplateId, Unit, UnitId, WarehousingStrategy, WeightInputMode,
};

use crate::command_dispatcher::DispatchError;
use crate::store::CatalogTx;

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Image file sent with a product. `content` travels as standard base64 and
/// is decoded once, while the request is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub file_name: String,
    #[serde(with = "base64_content")]
    pub content: Vec<u8>,
}

impl ImageUpload {
    fn extension_allowed(&self) -> bool {
        self.file_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl From<&ImageUpload> for ProductImage {
    fn from(upload: &ImageUpload) -> Self {
        ProductImage {
            file_name: upload.file_name.clone(),
            content: upload.content.clone(),
        }
    }
}

mod base64_content {
    use super::BASE64;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.trim())
            .map_err(|e| de::Error::custom(format!("must be valid base64: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeUnitInput {
    /// Present for existing entries; omitted for new ones.
    #[serde(default)]
    pub id: Option<AlternativeUnitId>,
    pub target_unit_id: UnitId,
    pub conversion_ratio: Measure,
}

impl From<&AlternativeUnitInput> for ProductAlternativeUnit {
    fn from(input: &AlternativeUnitInput) -> Self {
        let mut unit = ProductAlternativeUnit::new(input.target_unit_id, input.conversion_ratio);
        if let Some(id) = input.id {
            unit.id = id;
        }
        unit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub key: String,
    pub value: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFields {
    pub name: String,
    pub code: String,
    pub catalog_number: Option<String>,
    pub pkwiu_code: Option<String>,
    pub cn_code: Option<String>,
    pub category_id: Option<CategoryId>,
    pub size_unit_id: Option<UnitId>,
    pub weight_unit_id: Option<UnitId>,
    /// A new image; when absent a change keeps the current one.
    pub image: Option<ImageUpload>,
    /// Clear the current image. Cannot be combined with `image`.
    pub remove_image: bool,
    pub description: Option<String>,
    pub warehousing_strategy: WarehousingStrategy,
    pub alternative_units: Vec<AlternativeUnitInput>,
    pub attributes_data_model_id: Option<AttributeModelId>,
    pub attributes: Vec<AttributeValue>,
    pub handling_unit_item_data_model_id: Option<AttributeModelId>,
    pub is_freezable: bool,
    pub is_perishable: bool,
    pub default_use_by_days: i32,
    pub default_freeze_days: i32,
    pub default_quantity: Measure,
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
    pub quantity_step: f64,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub min_storage_temperature: Option<f64>,
    pub max_storage_temperature: Option<f64>,
    pub purchase_tax_rate_id: Option<TaxRateId>,
    pub sales_tax_rate_id: Option<TaxRateId>,
}

impl Default for ProductFields {
    fn default() -> Self {
        Self {
            name: String::new(),
            code: String::new(),
            catalog_number: None,
            pkwiu_code: None,
            cn_code: None,
            category_id: None,
            size_unit_id: None,
            weight_unit_id: None,
            image: None,
            remove_image: false,
            description: None,
            warehousing_strategy: WarehousingStrategy::default(),
            alternative_units: Vec::new(),
            attributes_data_model_id: None,
            attributes: Vec::new(),
            handling_unit_item_data_model_id: None,
            is_freezable: false,
            is_perishable: true,
            default_use_by_days: 0,
            default_freeze_days: 0,
            default_quantity: Measure::ZERO,
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
            quantity_step: DEFAULT_QUANTITY_STEP,
            min_weight: None,
            max_weight: None,
            min_storage_temperature: None,
            max_storage_temperature: None,
            purchase_tax_rate_id: None,
            sales_tax_rate_id: None,
        }
    }
}

impl ProductFields {
    /// Stateless field rules. `base_unit_id` is the unit alternative units
    /// are checked against.
    pub fn check(&self, v: &mut Validator, base_unit_id: Option<UnitId>) {
        v.not_empty("name", &self.name)
            .trimmed("name", &self.name)
            .trimmed("code", &self.code)
            .max_length("code", &self.code, MAX_CODE_LENGTH)
            .max_length_opt("catalog_number", self.catalog_number.as_deref(), MAX_CODE_LENGTH)
            .max_length_opt("pkwiu_code", self.pkwiu_code.as_deref(), MAX_CODE_LENGTH)
            .max_length_opt("cn_code", self.cn_code.as_deref(), MAX_CODE_LENGTH)
            .required("purchase_tax_rate_id", self.purchase_tax_rate_id.as_ref())
            .required("sales_tax_rate_id", self.sales_tax_rate_id.as_ref())
            .non_negative("quantity_step", self.quantity_step)
            .non_negative("default_use_by_days", self.default_use_by_days)
            .non_negative("default_freeze_days", self.default_freeze_days)
            .non_negative("default_quantity", self.default_quantity)
            .non_negative("net_weight", self.net_weight)
            .non_negative("tare", self.tare)
            .non_negative("width", self.width)
            .non_negative("height", self.height)
            .non_negative("depth", self.depth)
            .non_negative_opt("min_weight", self.min_weight)
            .non_negative_opt("max_weight", self.max_weight)
            .ordered("min_weight", self.min_weight, self.max_weight)
            .ordered(
                "min_storage_temperature",
                self.min_storage_temperature,
                self.max_storage_temperature,
            )
            .unique_by("alternative_units", "target_unit_id", &self.alternative_units, |u| {
                u.target_unit_id
            })
            .unique_by_present("alternative_units", "id", &self.alternative_units, |u| u.id);

        for (i, unit) in self.alternative_units.iter().enumerate() {
            if base_unit_id == Some(unit.target_unit_id) {
                v.add(format!("alternative_units[{i}].target_unit_id"), SAME_AS_BASE_UNIT);
            }
            v.check(
                unit.conversion_ratio > Measure::ZERO,
                format!("alternative_units[{i}].conversion_ratio"),
                "must be greater than 0",
            );
        }

        if let Some(image) = &self.image {
            v.not_empty("image.file_name", &image.file_name);
            v.check(
                image.extension_allowed(),
                "image.file_name",
                format!("must be an image file ({})", IMAGE_EXTENSIONS.join(", ")),
            );
            v.check(
                image.content.len() <= MAX_IMAGE_BYTES,
                "image.content",
                format!("must be at most {} MiB", MAX_IMAGE_BYTES / (1024 * 1024)),
            );
            v.check(!self.remove_image, "remove_image", "cannot be combined with a new image");
        }
    }

    pub fn alternative_units(&self) -> Vec<ProductAlternativeUnit> {
        self.alternative_units.iter().map(ProductAlternativeUnit::from).collect()
    }
}

/// Resolved reference rows a field set is applied with.
#[derive(Debug, Clone)]
pub struct ResolvedUnits {
    pub base: Unit,
    pub weight: Option<Unit>,
    pub size: Option<Unit>,
}

pub async fn load_unit(tx: &mut dyn CatalogTx, id: UnitId) -> Result<Unit, DispatchError> {
    tx.unit(id)
        .await?
        .ok_or_else(|| DispatchError::NotFound(format!("unit {id}")))
}

pub async fn load_optional_unit(tx: &mut dyn CatalogTx, id: Option<UnitId>) -> Result<Option<Unit>, DispatchError> {
    match id {
        Some(id) => Ok(Some(load_unit(tx, id).await?)),
        None => Ok(None),
    }
}

/// Create or update the product's attribute data. Without a model the
/// current data is left as is.
pub async fn save_attributes(
    tx: &mut dyn CatalogTx,
    current: Option<AttributeDataId>,
    fields: &ProductFields,
) -> Result<Option<AttributeDataId>, DispatchError> {
    let Some(model_id) = fields.attributes_data_model_id else {
        return Ok(current);
    };
    if !tx.attribute_models().await?.iter().any(|m| m.id == model_id) {
        return Err(DispatchError::NotFound(format!("attribute model {model_id}")));
    }

    let existing = match current {
        Some(id) => tx.attribute_data(id).await?,
        None => None,
    };
    let mut values = match &existing {
        Some(data) if data.model_id == model_id => data.values.as_object().cloned().unwrap_or_default(),
        _ => Map::new(),
    };
    for attribute in &fields.attributes {
        values.insert(attribute.key.clone(), attribute.value.clone());
    }

    match existing {
        Some(data) => {
            let updated = AttributeData {
                id: data.id,
                model_id,
                values: JsonValue::Object(values),
            };
            tx.update_attribute_data(&updated).await?;
            Ok(Some(updated.id))
        }
        None => {
            let created = AttributeData {
                id: AttributeDataId::new(),
                model_id,
                values: JsonValue::Object(values),
            };
            tx.insert_attribute_data(&created).await?;
            Ok(Some(created.id))
        }
    }
}

/// Apply every field through the product's mutators. Stops at the first
/// guard failure; the caller drops the transaction then.
pub fn apply(product: &mut Product, fields: &ProductFields, units: &ResolvedUnits) -> Result<(), DispatchError> {
    product.change_name(fields.name.as_str())?;
    product.change_units(&units.base, fields.alternative_units())?;
    product.set_weight_unit(units.weight.as_ref())?;
    product.set_size_unit(units.size.as_ref())?;
    product.set_category(fields.category_id);
    product.set_warehousing_strategy(fields.warehousing_strategy);
    product.set_description(fields.description.clone());
    product.set_catalog_codes(
        fields.catalog_number.clone(),
        fields.pkwiu_code.clone(),
        fields.cn_code.clone(),
    )?;
    product.set_number_generator_template(fields.number_generator_template_id);
    product.set_handling_unit_item_data_model(fields.handling_unit_item_data_model_id);

    product.set_quantity_input_modes(fields.quantity_input_modes, &units.base)?;
    product.set_quantity_step(fields.quantity_step)?;
    product.set_weight_input_modes(fields.has_weight, fields.weight_input_modes, &units.base)?;
    product.change_weight(fields.net_weight, fields.tare)?;
    product.set_size_input_modes(fields.has_size, fields.size_input_modes);
    product.change_size(fields.width, fields.height, fields.depth)?;

    product.set_shelf_life(fields.default_use_by_days, fields.default_freeze_days)?;
    product.set_default_quantity(fields.default_quantity)?;
    product.set_storage_flags(fields.is_freezable, fields.is_perishable);
    product.set_weight_limits(fields.min_weight, fields.max_weight)?;
    product.set_storage_temperatures(fields.min_storage_temperature, fields.max_storage_temperature)?;

    if let (Some(purchase), Some(sales)) = (fields.purchase_tax_rate_id, fields.sales_tax_rate_id) {
        product.set_tax_rates(purchase, sales);
    }
    if let Some(image) = &fields.image {
        product.set_image(Some(ProductImage::from(image)))?;
    } else if fields.remove_image {
        product.set_image(None)?;
    }
    Ok(())
}

/// Lookups shared by the add and change validators.
pub async fn check_references(
    tx: &mut dyn CatalogTx,
    v: &mut Validator,
    fields: &ProductFields,
) -> Result<(), DispatchError> {
    if let Some(id) = fields.category_id {
        v.check(tx.category(id).await?.is_some(), "category_id", "does not exist");
    }
    if let Some(id) = fields.number_generator_template_id {
        v.check(tx.template(id).await?.is_some(), "number_generator_template_id", "does not exist");
    }
    if let Some(id) = fields.handling_unit_item_data_model_id {
        let models = tx.attribute_models().await?;
        v.check(
            models.iter().any(|m| m.id == id),
            "handling_unit_item_data_model_id",
            "does not exist",
        );
    }
    for (property, id) in [
        ("purchase_tax_rate_id", fields.purchase_tax_rate_id),
        ("sales_tax_rate_id", fields.sales_tax_rate_id),
    ] {
        if let Some(id) = id {
            v.check(tx.tax_rate(id).await?.is_some(), property, "does not exist");
        }
    }

    let units = tx.units().await?;
    let unit = |id: UnitId| units.iter().find(|u| u.id == id);
    if let Some(id) = fields.weight_unit_id {
        match unit(id) {
            Some(u) => v.check(u.is_weighted, "weight_unit_id", "Weight unit must be a weighted unit."),
            None => v.add("weight_unit_id", "does not exist"),
        };
    }
    if let Some(id) = fields.size_unit_id {
        match unit(id) {
            Some(u) => v.check(!u.is_weighted, "size_unit_id", "Size unit cannot be a weighted unit."),
            None => v.add("size_unit_id", "does not exist"),
        };
    }
    for (i, alternative) in fields.alternative_units.iter().enumerate() {
        v.check(
            unit(alternative.target_unit_id).is_some(),
            format!("alternative_units[{i}].target_unit_id"),
            "does not exist",
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use catalog_core::ValidationSummary;
    use serde_json::json;

    use super::*;

    fn fields() -> ProductFields {
        ProductFields {
            name: "Milk".to_string(),
            purchase_tax_rate_id: Some(TaxRateId::new()),
            sales_tax_rate_id: Some(TaxRateId::new()),
            ..ProductFields::default()
        }
    }

    fn summary(fields: &ProductFields, base: Option<UnitId>) -> ValidationSummary {
        let mut v = Validator::new();
        fields.check(&mut v, base);
        v.finish()
    }

    #[test]
    fn defaults_pass() {
        assert!(summary(&fields(), None).is_valid());
        assert!(ProductFields::default().is_perishable);
    }

    #[test]
    fn ordered_pairs_report_the_minimum() {
        let f = ProductFields {
            min_storage_temperature: Some(8.0),
            max_storage_temperature: Some(2.0),
            min_weight: Some(5.0),
            max_weight: Some(1.0),
            ..fields()
        };
        let s = summary(&f, None);
        assert!(s.has_error_for("min_storage_temperature"));
        assert!(s.has_error_for("min_weight"));
    }

    #[test]
    fn alternative_units_are_checked_against_base_and_each_other() {
        let base = UnitId::new();
        let other = UnitId::new();
        let input = |target| AlternativeUnitInput {
            id: None,
            target_unit_id: target,
            conversion_ratio: Measure::from_units(12),
        };
        let f = ProductFields {
            alternative_units: vec![input(base), input(other), input(other)],
            ..fields()
        };
        let s = summary(&f, Some(base));
        assert!(s.errors.iter().any(|e| e.property == "alternative_units[0].target_unit_id"
            && e.message == SAME_AS_BASE_UNIT));
        assert!(s.has_error_for("alternative_units[2].target_unit_id"));
        assert!(!s.has_error_for("alternative_units[1].target_unit_id"));
    }

    fn with_image(name: &str, content: Vec<u8>) -> ProductFields {
        ProductFields {
            image: Some(ImageUpload {
                file_name: name.to_string(),
                content,
            }),
            ..fields()
        }
    }

    #[test]
    fn image_rules() {
        assert!(summary(&with_image("photo.PNG", vec![1, 2, 3]), None).is_valid());
        assert!(summary(&with_image("notes.txt", vec![1]), None).has_error_for("image.file_name"));

        let too_big = with_image("photo.png", vec![0u8; MAX_IMAGE_BYTES + 1]);
        assert!(summary(&too_big, None).has_error_for("image.content"));

        let both = ProductFields {
            remove_image: true,
            ..with_image("photo.png", vec![1])
        };
        assert!(summary(&both, None).has_error_for("remove_image"));
    }

    #[test]
    fn image_content_is_base64_on_the_wire() {
        let upload: ImageUpload =
            serde_json::from_value(json!({"file_name": "a.png", "content": BASE64.encode([7, 8, 9])})).unwrap();
        assert_eq!(upload.content, vec![7, 8, 9]);
        assert_eq!(serde_json::to_value(&upload).unwrap()["content"], BASE64.encode([7, 8, 9]));

        let err = serde_json::from_value::<ImageUpload>(json!({"file_name": "a.png", "content": "***"})).unwrap_err();
        assert!(err.to_string().contains("must be valid base64"));
    }

    #[test]
    fn missing_tax_rates_are_required() {
        let s = summary(&ProductFields { name: "x".to_string(), ..ProductFields::default() }, None);
        assert!(s.has_error_for("purchase_tax_rate_id"));
        assert!(s.has_error_for("sales_tax_rate_id"));
    }
}
