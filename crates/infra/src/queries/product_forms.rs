//! Data backing the add and change product forms.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catalog_products::{
    DEFAULT_QUANTITY_STEP, InputModes, NumberGeneratorTemplate, ProductCategory, ProductId, ProductType,
    QuantityInputMode, SizeInputMode, TaxRate, TaxRateId, TemplateId, Unit, UnitId, WarehousingStrategy,
    WeightInputMode,
};

use super::get_products::{ProductResponse, single};
use crate::command_dispatcher::{CatalogQuery, DispatchError};
use crate::settings::ProductSettings;
use crate::store::CatalogTx;

/// Select options shared by both forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormOptions {
    pub units: Vec<Unit>,
    pub categories: Vec<ProductCategory>,
    pub tax_rates: Vec<TaxRate>,
    pub number_generator_templates: Vec<NumberGeneratorTemplate>,
}

impl FormOptions {
    async fn load(tx: &mut dyn CatalogTx) -> Result<Self, DispatchError> {
        Ok(Self {
            units: tx.units().await?,
            categories: tx.categories().await?,
            tax_rates: tx.tax_rates().await?,
            number_generator_templates: tx.templates().await?,
        })
    }
}

/// Prefilled values for a new product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddProductForm {
    pub product_type: ProductType,
    pub base_unit_id: UnitId,
    pub weight_unit_id: Option<UnitId>,
    pub size_unit_id: Option<UnitId>,
    pub purchase_tax_rate_id: TaxRateId,
    pub sales_tax_rate_id: TaxRateId,
    pub number_generator_template_id: Option<TemplateId>,
    pub warehousing_strategy: WarehousingStrategy,
    pub has_weight: bool,
    pub has_size: bool,
    pub quantity_input_modes: InputModes<QuantityInputMode>,
    pub weight_input_modes: InputModes<WeightInputMode>,
    pub size_input_modes: InputModes<SizeInputMode>,
    pub quantity_step: f64,
    pub is_perishable: bool,
    pub attributes_use_case: String,
    pub options: FormOptions,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GetAddProductForm;

#[async_trait]
impl CatalogQuery for GetAddProductForm {
    type Output = AddProductForm;
    const NAME: &'static str = "products.add_form";

    async fn execute(&self, tx: &mut dyn CatalogTx, settings: &ProductSettings) -> Result<AddProductForm, DispatchError> {
        let base_unit = tx
            .unit(settings.default_base_unit_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("unit {}", settings.default_base_unit_id)))?;

        // Same normalisation the aggregate applies on save.
        let quantity_input_modes = if base_unit.is_weighted {
            settings.quantity_input_modes
        } else {
            settings.quantity_input_modes.without(QuantityInputMode::FromScale)
        };
        let weight_input_modes = if base_unit.is_weighted {
            settings.weight_input_modes.without(WeightInputMode::FromQuantity)
        } else {
            settings.weight_input_modes
        };

        Ok(AddProductForm {
            product_type: ProductType::Good,
            base_unit_id: base_unit.id,
            weight_unit_id: settings.default_weight_unit_id,
            size_unit_id: settings.default_size_unit_id,
            purchase_tax_rate_id: settings.default_purchase_tax_rate_id,
            sales_tax_rate_id: settings.default_sales_tax_rate_id,
            number_generator_template_id: settings.default_number_generator_template_id,
            warehousing_strategy: WarehousingStrategy::default(),
            has_weight: settings.has_weight.resolve(&base_unit),
            has_size: settings.has_size,
            quantity_input_modes,
            weight_input_modes,
            size_input_modes: settings.size_input_modes,
            quantity_step: DEFAULT_QUANTITY_STEP,
            is_perishable: true,
            attributes_use_case: ProductType::Good.attributes_use_case().to_string(),
            options: FormOptions::load(tx).await?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProductForm {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub options: FormOptions,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetChangeProductForm {
    pub id: ProductId,
}

#[async_trait]
impl CatalogQuery for GetChangeProductForm {
    type Output = ChangeProductForm;
    const NAME: &'static str = "products.change_form";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<ChangeProductForm, DispatchError> {
        let product = tx
            .product(self.id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("product {}", self.id)))?;
        Ok(ChangeProductForm {
            product: single(tx, &product).await?,
            options: FormOptions::load(tx).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::HasWeightBehaviour;
    use crate::store::{CatalogStore, InMemoryCatalogStore, seed};

    #[tokio::test]
    async fn add_form_drops_scale_input_for_counted_base_unit() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();

        let form = GetAddProductForm
            .execute(tx.as_mut(), &ProductSettings::default())
            .await
            .unwrap();
        assert_eq!(form.base_unit_id, seed::PIECE);
        assert!(!form.quantity_input_modes.contains(QuantityInputMode::FromScale));
        assert!(form.quantity_input_modes.contains(QuantityInputMode::FromUserInput));
        assert!(form.has_weight);
        assert_eq!(form.options.units.len(), 6);
    }

    #[tokio::test]
    async fn add_form_resolves_has_weight_against_base_unit() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();

        let mut settings = ProductSettings {
            has_weight: HasWeightBehaviour::TrueIfWeighted,
            ..ProductSettings::default()
        };
        let form = GetAddProductForm.execute(tx.as_mut(), &settings).await.unwrap();
        assert!(!form.has_weight);

        settings.default_base_unit_id = seed::KILOGRAM;
        let form = GetAddProductForm.execute(tx.as_mut(), &settings).await.unwrap();
        assert!(form.has_weight);
        assert!(form.quantity_input_modes.contains(QuantityInputMode::FromScale));
    }

    #[tokio::test]
    async fn change_form_for_unknown_product_is_not_found() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = GetChangeProductForm { id: ProductId::new() }
            .execute(tx.as_mut(), &ProductSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }
}
