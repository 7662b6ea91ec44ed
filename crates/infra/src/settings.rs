//! Catalog defaults applied when a product is created.

use serde::{Deserialize, Serialize};

use catalog_products::{
    InputModes, QuantityInputMode, SizeInputMode, TaxRateId, TemplateId, Unit, UnitId, WeightInputMode,
};

use crate::store::seed;

pub const DEFAULT_CODE_TEMPLATE: &str = "PRD/{seq:5}";

/// Whether new products track weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HasWeightBehaviour {
    False,
    #[default]
    True,
    /// Only when the base unit is itself a weight.
    TrueIfWeighted,
}

impl HasWeightBehaviour {
    pub fn resolve(self, base_unit: &Unit) -> bool {
        match self {
            HasWeightBehaviour::False => false,
            HasWeightBehaviour::True => true,
            HasWeightBehaviour::TrueIfWeighted => base_unit.is_weighted,
        }
    }
}

impl core::str::FromStr for HasWeightBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" => Ok(Self::False),
            "true" => Ok(Self::True),
            "true_if_weighted" => Ok(Self::TrueIfWeighted),
            other => Err(format!("invalid has-weight behaviour: {other} (expected true|false|true_if_weighted)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSettings {
    pub default_base_unit_id: UnitId,
    pub default_weight_unit_id: Option<UnitId>,
    pub default_size_unit_id: Option<UnitId>,
    pub default_purchase_tax_rate_id: TaxRateId,
    pub default_sales_tax_rate_id: TaxRateId,
    /// Template used to generate a code when none is given.
    pub code_template: String,
    /// Preselected batch-number template for new products.
    pub default_number_generator_template_id: Option<TemplateId>,
    pub has_weight: HasWeightBehaviour,
    pub has_size: bool,
    pub quantity_input_modes: InputModes<QuantityInputMode>,
    pub weight_input_modes: InputModes<WeightInputMode>,
    pub size_input_modes: InputModes<SizeInputMode>,
}

impl Default for ProductSettings {
    fn default() -> Self {
        Self {
            default_base_unit_id: seed::PIECE,
            default_weight_unit_id: Some(seed::KILOGRAM),
            default_size_unit_id: Some(seed::CENTIMETRE),
            default_purchase_tax_rate_id: seed::VAT_23,
            default_sales_tax_rate_id: seed::VAT_23,
            code_template: DEFAULT_CODE_TEMPLATE.to_string(),
            default_number_generator_template_id: Some(seed::BATCH_TEMPLATE),
            has_weight: HasWeightBehaviour::True,
            has_size: false,
            quantity_input_modes: InputModes::from([QuantityInputMode::FromScale, QuantityInputMode::FromUserInput]),
            weight_input_modes: InputModes::from([WeightInputMode::FromScale, WeightInputMode::FromUserInput]),
            size_input_modes: InputModes::empty(),
        }
    }
}
