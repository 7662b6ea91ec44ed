//! In-memory catalog store.
//!
//! Intended for tests/dev and for running without a database. A transaction
//! holds the state lock for its whole lifetime and works on a copy, so
//! transactions are serialized and a dropped transaction leaves no trace.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use catalog_core::AggregateRoot;
use catalog_products::{
    AttributeData, AttributeDataId, AttributeModel, NumberGeneratorTemplate, PluVariant, PriceList, Product,
    ProductCategory, ProductData, ProductId, TaxRate, Unit,
};

use super::seed::{ReferenceData, reference_data};
use super::{CatalogStore, CatalogTx, ProductSelection, StoreError};
use crate::queries::data_table::{DataTableQuery, ProductColumn, ProductRow, SortDirection};

#[derive(Debug, Clone, Default)]
struct CatalogState {
    units: Vec<Unit>,
    categories: Vec<ProductCategory>,
    tax_rates: Vec<TaxRate>,
    templates: Vec<NumberGeneratorTemplate>,
    price_lists: Vec<PriceList>,
    attribute_models: Vec<AttributeModel>,
    attribute_data: HashMap<AttributeDataId, AttributeData>,
    products: HashMap<ProductId, (ProductData, u64)>,
    plu_variants: Vec<PluVariant>,
    sequences: HashMap<String, i64>,
}

impl From<ReferenceData> for CatalogState {
    fn from(reference: ReferenceData) -> Self {
        Self {
            units: reference.units,
            categories: reference.categories,
            tax_rates: reference.tax_rates,
            templates: reference.templates,
            price_lists: reference.price_lists,
            attribute_models: reference.attribute_models,
            ..Self::default()
        }
    }
}

impl CatalogState {
    fn category_name(&self, data: &ProductData) -> Option<&str> {
        let id = data.category_id?;
        self.categories.iter().find(|c| c.id == id).map(|c| c.name.as_str())
    }

    fn ensure_code_free(&self, data: &ProductData) -> Result<(), StoreError> {
        let taken = self
            .products
            .values()
            .any(|(other, _)| other.id != data.id && other.code == data.code);
        if taken {
            return Err(StoreError::UniqueViolation("code".to_string()));
        }
        Ok(())
    }

    /// Mirrors the foreign keys of the relational schema.
    fn ensure_references(&self, data: &ProductData) -> Result<(), StoreError> {
        let missing = |what: &str, id: String| Err(StoreError::ForeignKey(format!("{what} {id} does not exist")));
        let has_unit = |id| self.units.iter().any(|u| u.id == id);

        for unit_id in [Some(data.base_unit_id), data.weight_unit_id, data.size_unit_id]
            .into_iter()
            .flatten()
            .chain(data.alternative_units.iter().map(|a| a.target_unit_id))
        {
            if !has_unit(unit_id) {
                return missing("unit", unit_id.to_string());
            }
        }
        if let Some(category_id) = data.category_id {
            if !self.categories.iter().any(|c| c.id == category_id) {
                return missing("category", category_id.to_string());
            }
        }
        for tax_rate_id in [data.purchase_tax_rate_id, data.sales_tax_rate_id] {
            if !self.tax_rates.iter().any(|t| t.id == tax_rate_id) {
                return missing("tax rate", tax_rate_id.to_string());
            }
        }
        if let Some(template_id) = data.number_generator_template_id {
            if !self.templates.iter().any(|t| t.id == template_id) {
                return missing("template", template_id.to_string());
            }
        }
        for price in &data.prices {
            if !self.price_lists.iter().any(|p| p.id == price.price_list_id) {
                return missing("price list", price.price_list_id.to_string());
            }
        }
        if let Some(attributes_id) = data.attributes_data_id {
            if !self.attribute_data.contains_key(&attributes_id) {
                return missing("attribute data", attributes_id.to_string());
            }
        }
        if let Some(model_id) = data.handling_unit_item_data_model_id {
            if !self.attribute_models.iter().any(|m| m.id == model_id) {
                return missing("attribute model", model_id.to_string());
            }
        }
        Ok(())
    }

    fn row(&self, data: &ProductData) -> ProductRow {
        ProductRow {
            id: data.id,
            name: data.name.clone(),
            code: data.code.clone(),
            product_type: data.product_type,
            category_name: self.category_name(data).map(str::to_string),
            catalog_number: data.catalog_number.clone(),
        }
    }
}

/// Nulls sort last in both directions, matching the SQL store.
fn compare_rows(a: &ProductRow, b: &ProductRow, column: ProductColumn, direction: SortDirection) -> Ordering {
    fn nulls_last(a: Option<&str>, b: Option<&str>, direction: SortDirection) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => directed(a.cmp(b), direction),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
    fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    let primary = match column {
        ProductColumn::Name => directed(a.name.cmp(&b.name), direction),
        ProductColumn::Code => directed(a.code.cmp(&b.code), direction),
        ProductColumn::ProductType => directed(a.product_type.as_str().cmp(b.product_type.as_str()), direction),
        ProductColumn::CategoryName => nulls_last(a.category_name.as_deref(), b.category_name.as_deref(), direction),
        ProductColumn::CatalogNumber => {
            nulls_last(a.catalog_number.as_deref(), b.catalog_number.as_deref(), direction)
        }
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone)]
pub struct InMemoryCatalogStore {
    state: Arc<Mutex<CatalogState>>,
}

impl InMemoryCatalogStore {
    /// A store holding only the built-in reference data.
    pub fn new() -> Self {
        Self::with_reference_data(reference_data())
    }

    pub fn with_reference_data(reference: ReferenceData) -> Self {
        Self {
            state: Arc::new(Mutex::new(reference.into())),
        }
    }
}

impl Default for InMemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<CatalogState>,
    working: CatalogState,
}

impl InMemoryTx {
    fn load(&self, id: ProductId) -> Option<Product> {
        self.working
            .products
            .get(&id)
            .map(|(data, version)| Product::rehydrate(data.clone(), *version))
    }
}

#[async_trait]
impl CatalogTx for InMemoryTx {
    async fn units(&mut self) -> Result<Vec<Unit>, StoreError> {
        Ok(self.working.units.clone())
    }

    async fn categories(&mut self) -> Result<Vec<ProductCategory>, StoreError> {
        Ok(self.working.categories.clone())
    }

    async fn tax_rates(&mut self) -> Result<Vec<TaxRate>, StoreError> {
        Ok(self.working.tax_rates.clone())
    }

    async fn templates(&mut self) -> Result<Vec<NumberGeneratorTemplate>, StoreError> {
        Ok(self.working.templates.clone())
    }

    async fn price_lists(&mut self) -> Result<Vec<PriceList>, StoreError> {
        Ok(self.working.price_lists.clone())
    }

    async fn attribute_models(&mut self) -> Result<Vec<AttributeModel>, StoreError> {
        Ok(self.working.attribute_models.clone())
    }

    async fn attribute_data(&mut self, id: AttributeDataId) -> Result<Option<AttributeData>, StoreError> {
        Ok(self.working.attribute_data.get(&id).cloned())
    }

    async fn insert_attribute_data(&mut self, data: &AttributeData) -> Result<(), StoreError> {
        if !self.working.attribute_models.iter().any(|m| m.id == data.model_id) {
            return Err(StoreError::ForeignKey(format!("attribute model {} does not exist", data.model_id)));
        }
        if self.working.attribute_data.contains_key(&data.id) {
            return Err(StoreError::UniqueViolation("attributes_data_id".to_string()));
        }
        self.working.attribute_data.insert(data.id, data.clone());
        Ok(())
    }

    async fn update_attribute_data(&mut self, data: &AttributeData) -> Result<(), StoreError> {
        match self.working.attribute_data.get_mut(&data.id) {
            Some(existing) => {
                *existing = data.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("attribute data", data.id)),
        }
    }

    async fn delete_attribute_data(&mut self, id: AttributeDataId) -> Result<(), StoreError> {
        let referenced = self
            .working
            .products
            .values()
            .any(|(data, _)| data.attributes_data_id == Some(id));
        if referenced {
            return Err(StoreError::ForeignKey(format!("attribute data {id} is still referenced")));
        }
        self.working.attribute_data.remove(&id);
        Ok(())
    }

    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.load(id))
    }

    async fn product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError> {
        let id = self
            .working
            .products
            .values()
            .find(|(data, _)| data.code == code)
            .map(|(data, _)| data.id);
        Ok(id.and_then(|id| self.load(id)))
    }

    async fn products(&mut self, selection: &ProductSelection) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self
            .working
            .products
            .values()
            .filter(|(data, _)| match selection {
                ProductSelection::All => true,
                ProductSelection::Ids(ids) => ids.contains(&data.id),
                ProductSelection::Codes(codes) => codes.iter().any(|c| *c == data.code),
            })
            .map(|(data, version)| Product::rehydrate(data.clone(), *version))
            .collect();
        products.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id_typed().cmp(&b.id_typed())));
        Ok(products)
    }

    async fn code_taken(&mut self, code: &str, except: Option<ProductId>) -> Result<bool, StoreError> {
        Ok(self
            .working
            .products
            .values()
            .any(|(data, _)| data.code == code && Some(data.id) != except))
    }

    async fn insert_product(&mut self, product: &mut Product) -> Result<u64, StoreError> {
        let data = product.data();
        if self.working.products.contains_key(&data.id) {
            return Err(StoreError::UniqueViolation("id".to_string()));
        }
        self.working.ensure_code_free(data)?;
        self.working.ensure_references(data)?;

        let version = product.mark_saved();
        self.working
            .products
            .insert(product.id_typed(), (product.data().clone(), version));
        Ok(version)
    }

    async fn update_product(&mut self, product: &mut Product) -> Result<u64, StoreError> {
        let id = product.id_typed();
        let stored_version = match self.working.products.get(&id) {
            Some((_, version)) => *version,
            None => return Err(StoreError::not_found("product", id)),
        };
        if stored_version != product.version() {
            return Err(StoreError::Conflict(format!(
                "product {id} is at version {stored_version}, not {}",
                product.version()
            )));
        }
        self.working.ensure_code_free(product.data())?;
        self.working.ensure_references(product.data())?;

        let version = product.mark_saved();
        self.working.products.insert(id, (product.data().clone(), version));
        Ok(version)
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        if self.working.plu_variants.iter().any(|v| v.plu_id == id) {
            return Err(StoreError::ForeignKey(format!("product {id} still has PLU variants")));
        }
        match self.working.products.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("product", id)),
        }
    }

    async fn plu_variants(&mut self, product_id: ProductId) -> Result<Vec<PluVariant>, StoreError> {
        Ok(self
            .working
            .plu_variants
            .iter()
            .filter(|v| v.plu_id == product_id)
            .cloned()
            .collect())
    }

    async fn insert_plu_variant(&mut self, variant: &PluVariant) -> Result<(), StoreError> {
        if !self.working.products.contains_key(&variant.plu_id) {
            return Err(StoreError::ForeignKey(format!("product {} does not exist", variant.plu_id)));
        }
        self.working.plu_variants.push(variant.clone());
        Ok(())
    }

    async fn delete_plu_variants(&mut self, product_id: ProductId) -> Result<u64, StoreError> {
        let before = self.working.plu_variants.len();
        self.working.plu_variants.retain(|v| v.plu_id != product_id);
        Ok((before - self.working.plu_variants.len()) as u64)
    }

    async fn product_page(&mut self, query: &DataTableQuery) -> Result<(Vec<ProductRow>, u64), StoreError> {
        let state = &self.working;
        let mut rows: Vec<ProductRow> = state
            .products
            .values()
            .map(|(data, _)| data)
            .filter(|data| {
                let category = state.category_name(data);
                query.filters.iter().all(|f| f.matches(data, category))
            })
            .map(|data| state.row(data))
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, query.sort, query.direction));

        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn next_sequence(&mut self, name: &str) -> Result<i64, StoreError> {
        let counter = self.working.sequences.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::seed;
    use catalog_products::{NewProduct, ProductType};
    use chrono::Utc;

    fn piece() -> Unit {
        reference_data().units.into_iter().find(|u| u.id == seed::PIECE).unwrap()
    }

    fn new_product(name: &str, code: &str) -> Product {
        let base = piece();
        Product::create(
            NewProduct {
                id: ProductId::new(),
                name: name.to_string(),
                code: code.to_string(),
                product_type: ProductType::Good,
                base_unit: &base,
                purchase_tax_rate_id: seed::VAT_23,
                sales_tax_rate_id: seed::VAT_23,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn uncommitted_changes_are_discarded() {
        let store = InMemoryCatalogStore::new();

        let mut tx = store.begin().await.unwrap();
        let mut product = new_product("Milk", "MLK");
        tx.insert_product(&mut product).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.product(product.id_typed()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn versions_advance_and_stale_writes_conflict() {
        let store = InMemoryCatalogStore::new();
        let mut product = new_product("Milk", "MLK");

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.insert_product(&mut product).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut first = tx.product(product.id_typed()).await.unwrap().unwrap();
        let mut stale = first.clone();
        assert_eq!(tx.update_product(&mut first).await.unwrap(), 2);

        let err = tx.update_product(&mut stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_codes_and_dangling_references_are_rejected() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&mut new_product("Milk", "X")).await.unwrap();

        let err = tx.insert_product(&mut new_product("Bread", "X")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(ref p) if p == "code"));

        let mut orphan = new_product("Cheese", "Y");
        orphan.set_category(Some(catalog_products::CategoryId::new()));
        let err = tx.insert_product(&mut orphan).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKey(_)));
    }

    #[tokio::test]
    async fn sequences_are_per_name() {
        let store = InMemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.next_sequence("a").await.unwrap(), 1);
        assert_eq!(tx.next_sequence("a").await.unwrap(), 2);
        assert_eq!(tx.next_sequence("b").await.unwrap(), 1);
    }

    #[test]
    fn null_sort_keys_go_last_both_ways() {
        let row = |name: &str, catalog: Option<&str>| ProductRow {
            id: ProductId::new(),
            name: name.to_string(),
            code: name.to_string(),
            product_type: ProductType::Good,
            category_name: None,
            catalog_number: catalog.map(str::to_string),
        };
        let mut rows = vec![row("a", None), row("b", Some("2")), row("c", Some("1"))];

        rows.sort_by(|a, b| compare_rows(a, b, ProductColumn::CatalogNumber, SortDirection::Desc));
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);
    }
}
