//! Postgres-backed catalog store.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `23505` | `UniqueViolation` | Duplicate product code, duplicate child key |
//! | `23503` | `ForeignKey` | Unknown unit/tax rate/..., product still has PLU variants |
//! | `23514` | `Database` | Check constraint (should be caught by validation first) |
//! | Any other | `Database` | Network errors, connection failures, etc. |
//!
//! ## Numeric columns
//!
//! [`Measure`] values are stored as `NUMERIC(15, 6)`. They are written as
//! decimal strings cast with `::numeric` and read back with `::text`, so no
//! value ever passes through a float.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use catalog_core::{AggregateRoot, Measure};
use catalog_products::{
    AlternativeUnitId, AttributeData, AttributeDataId, AttributeModel, AttributeModelId, CategoryId, InputModes,
    NumberGeneratorTemplate, PluVariant, PluVariantId, PriceList, PriceListId, Product, ProductAlternativeUnit,
    ProductCategory, ProductData, ProductId, ProductImage, ProductPrice, TaxRate, TaxRateId, TemplateId, Unit,
    UnitId,
};

use super::{CatalogStore, CatalogTx, ProductSelection, StoreError};
use crate::queries::data_table::{DataTableQuery, ProductColumn, ProductFilter, ProductRow, SortDirection, TextField};

#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema and reference-data migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Database {
                operation: "migrate",
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

const PRODUCT_SELECT: &str = r#"
    SELECT
        p.id, p.version, p.name, p.code, p.product_type, p.category_id,
        p.base_unit_id, p.weight_unit_id, p.size_unit_id, p.warehousing_strategy,
        p.image_file_name, p.image_content, p.description,
        p.catalog_number, p.pkwiu_code, p.cn_code, p.number_generator_template_id,
        p.quantity_input_modes, p.has_weight, p.weight_input_modes, p.has_size, p.size_input_modes,
        p.net_weight::text AS net_weight, p.tare::text AS tare,
        p.width::text AS width, p.height::text AS height, p.depth::text AS depth,
        p.default_use_by_days, p.default_freeze_days, p.quantity_step,
        p.default_quantity::text AS default_quantity,
        p.is_freezable, p.is_perishable,
        p.min_weight, p.max_weight, p.min_storage_temperature, p.max_storage_temperature,
        p.purchase_tax_rate_id, p.sales_tax_rate_id, p.attributes_data_id,
        p.handling_unit_item_data_model_id,
        p.created_at, p.last_modified
    FROM products p
"#;

const PRODUCT_INSERT: &str = r#"
    INSERT INTO products (
        id, version, name, code, product_type, category_id,
        base_unit_id, weight_unit_id, size_unit_id, warehousing_strategy,
        image_file_name, image_content, description,
        catalog_number, pkwiu_code, cn_code, number_generator_template_id,
        quantity_input_modes, has_weight, weight_input_modes, has_size, size_input_modes,
        net_weight, tare, width, height, depth,
        default_use_by_days, default_freeze_days, quantity_step, default_quantity,
        is_freezable, is_perishable,
        min_weight, max_weight, min_storage_temperature, max_storage_temperature,
        purchase_tax_rate_id, sales_tax_rate_id, attributes_data_id,
        handling_unit_item_data_model_id,
        created_at, last_modified
    ) VALUES (
        $1, $2, $3, $4, $5, $6,
        $7, $8, $9, $10,
        $11, $12, $13,
        $14, $15, $16, $17,
        $18, $19, $20, $21, $22,
        $23::numeric, $24::numeric, $25::numeric, $26::numeric, $27::numeric,
        $28, $29, $30, $31::numeric,
        $32, $33,
        $34, $35, $36, $37,
        $38, $39, $40,
        $41,
        $42, $43
    )
"#;

const PRODUCT_UPDATE: &str = r#"
    UPDATE products SET (
        version, name, code, product_type, category_id,
        base_unit_id, weight_unit_id, size_unit_id, warehousing_strategy,
        image_file_name, image_content, description,
        catalog_number, pkwiu_code, cn_code, number_generator_template_id,
        quantity_input_modes, has_weight, weight_input_modes, has_size, size_input_modes,
        net_weight, tare, width, height, depth,
        default_use_by_days, default_freeze_days, quantity_step, default_quantity,
        is_freezable, is_perishable,
        min_weight, max_weight, min_storage_temperature, max_storage_temperature,
        purchase_tax_rate_id, sales_tax_rate_id, attributes_data_id,
        handling_unit_item_data_model_id,
        created_at, last_modified
    ) = ROW(
        $2, $3, $4, $5, $6,
        $7, $8, $9, $10,
        $11, $12, $13,
        $14, $15, $16, $17,
        $18, $19, $20, $21, $22,
        $23::numeric, $24::numeric, $25::numeric, $26::numeric, $27::numeric,
        $28, $29, $30, $31::numeric,
        $32, $33,
        $34, $35, $36, $37,
        $38, $39, $40,
        $41,
        $42, $43
    )
    WHERE id = $1 AND version = $44
"#;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

/// Binds `$1..$43` in the column order shared by insert and update.
fn bind_product<'q>(query: PgQuery<'q>, data: &'q ProductData, version: u64) -> PgQuery<'q> {
    let uuid = |id: Option<&Uuid>| id.copied();
    query
        .bind(data.id.as_uuid())
        .bind(version as i64)
        .bind(data.name.as_str())
        .bind(data.code.as_str())
        .bind(data.product_type.as_str())
        .bind(uuid(data.category_id.as_ref().map(CategoryId::as_uuid)))
        .bind(data.base_unit_id.as_uuid())
        .bind(uuid(data.weight_unit_id.as_ref().map(UnitId::as_uuid)))
        .bind(uuid(data.size_unit_id.as_ref().map(UnitId::as_uuid)))
        .bind(data.warehousing_strategy.as_str())
        .bind(data.image.as_ref().map(|i| i.file_name.as_str()))
        .bind(data.image.as_ref().map(|i| i.content.as_slice()))
        .bind(data.description.as_deref())
        .bind(data.catalog_number.as_deref())
        .bind(data.pkwiu_code.as_deref())
        .bind(data.cn_code.as_deref())
        .bind(uuid(data.number_generator_template_id.as_ref().map(TemplateId::as_uuid)))
        .bind(data.quantity_input_modes.bits())
        .bind(data.has_weight)
        .bind(data.weight_input_modes.bits())
        .bind(data.has_size)
        .bind(data.size_input_modes.bits())
        .bind(data.net_weight.to_string())
        .bind(data.tare.to_string())
        .bind(data.width.to_string())
        .bind(data.height.to_string())
        .bind(data.depth.to_string())
        .bind(data.default_use_by_days)
        .bind(data.default_freeze_days)
        .bind(data.quantity_step)
        .bind(data.default_quantity.to_string())
        .bind(data.is_freezable)
        .bind(data.is_perishable)
        .bind(data.min_weight)
        .bind(data.max_weight)
        .bind(data.min_storage_temperature)
        .bind(data.max_storage_temperature)
        .bind(data.purchase_tax_rate_id.as_uuid())
        .bind(data.sales_tax_rate_id.as_uuid())
        .bind(uuid(data.attributes_data_id.as_ref().map(AttributeDataId::as_uuid)))
        .bind(uuid(data.handling_unit_item_data_model_id.as_ref().map(AttributeModelId::as_uuid)))
        .bind(data.created_at)
        .bind(data.last_modified)
}

impl PostgresTx {
    async fn fetch_products(&mut self, mut query: QueryBuilder<'_, Postgres>) -> Result<Vec<Product>, StoreError> {
        let rows = query
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_products", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(ProductRecord::from_row(&row).map_err(decode)?);
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = records.iter().map(|r| *r.data.id.as_uuid()).collect();
        let mut alternative_units = self.load_alternative_units(&ids).await?;
        let mut prices = self.load_prices(&ids).await?;

        Ok(records
            .into_iter()
            .map(|ProductRecord { mut data, version }| {
                let id = *data.id.as_uuid();
                data.alternative_units = alternative_units.remove(&id).unwrap_or_default();
                data.prices = prices.remove(&id).unwrap_or_default();
                Product::rehydrate(data, version)
            })
            .collect())
    }

    async fn load_alternative_units(
        &mut self,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ProductAlternativeUnit>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, target_unit_id, conversion_ratio::text AS conversion_ratio
            FROM product_alternative_units
            WHERE product_id = ANY($1)
            ORDER BY product_id, position
            "#,
        )
        .bind(product_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_alternative_units", e))?;

        let mut grouped: HashMap<Uuid, Vec<ProductAlternativeUnit>> = HashMap::new();
        for row in rows {
            let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
            let unit = ProductAlternativeUnit {
                id: AlternativeUnitId::from_uuid(row.try_get("id").map_err(decode)?),
                target_unit_id: UnitId::from_uuid(row.try_get("target_unit_id").map_err(decode)?),
                conversion_ratio: measure(&row, "conversion_ratio").map_err(decode)?,
            };
            grouped.entry(product_id).or_default().push(unit);
        }
        Ok(grouped)
    }

    async fn load_prices(&mut self, product_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ProductPrice>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, price_list_id, net_price::text AS net_price
            FROM product_prices
            WHERE product_id = ANY($1)
            ORDER BY product_id, position
            "#,
        )
        .bind(product_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_prices", e))?;

        let mut grouped: HashMap<Uuid, Vec<ProductPrice>> = HashMap::new();
        for row in rows {
            let product_id: Uuid = row.try_get("product_id").map_err(decode)?;
            let price = ProductPrice {
                price_list_id: PriceListId::from_uuid(row.try_get("price_list_id").map_err(decode)?),
                net_price: measure(&row, "net_price").map_err(decode)?,
            };
            grouped.entry(product_id).or_default().push(price);
        }
        Ok(grouped)
    }

    /// Owned rows are rewritten in full; their ids are preserved.
    async fn write_children(&mut self, data: &ProductData) -> Result<(), StoreError> {
        let product_id = data.id.as_uuid();

        sqlx::query("DELETE FROM product_alternative_units WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_alternative_units", e))?;
        for (position, unit) in data.alternative_units.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product_alternative_units (id, product_id, position, target_unit_id, conversion_ratio)
                VALUES ($1, $2, $3, $4, $5::numeric)
                "#,
            )
            .bind(unit.id.as_uuid())
            .bind(product_id)
            .bind(position as i32)
            .bind(unit.target_unit_id.as_uuid())
            .bind(unit.conversion_ratio.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_alternative_units", e))?;
        }

        sqlx::query("DELETE FROM product_prices WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_prices", e))?;
        for (position, price) in data.prices.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO product_prices (product_id, price_list_id, position, net_price)
                VALUES ($1, $2, $3, $4::numeric)
                "#,
            )
            .bind(product_id)
            .bind(price.price_list_id.as_uuid())
            .bind(position as i32)
            .bind(price.net_price.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_prices", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for PostgresTx {
    #[instrument(skip(self), err)]
    async fn units(&mut self) -> Result<Vec<Unit>, StoreError> {
        let rows = sqlx::query("SELECT id, name, symbol, is_weighted FROM units ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("units", e))?;
        rows.iter()
            .map(|row| -> Result<Unit, sqlx::Error> {
                Ok(Unit {
                    id: UnitId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    symbol: row.try_get("symbol")?,
                    is_weighted: row.try_get("is_weighted")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self), err)]
    async fn categories(&mut self) -> Result<Vec<ProductCategory>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM product_categories ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("categories", e))?;
        rows.iter()
            .map(|row| -> Result<ProductCategory, sqlx::Error> {
                Ok(ProductCategory {
                    id: CategoryId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self), err)]
    async fn tax_rates(&mut self) -> Result<Vec<TaxRate>, StoreError> {
        let rows = sqlx::query("SELECT id, name, value FROM tax_rates ORDER BY value DESC, name")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("tax_rates", e))?;
        rows.iter()
            .map(|row| -> Result<TaxRate, sqlx::Error> {
                Ok(TaxRate {
                    id: TaxRateId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    value: row.try_get("value")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self), err)]
    async fn templates(&mut self) -> Result<Vec<NumberGeneratorTemplate>, StoreError> {
        let rows = sqlx::query("SELECT id, name, template FROM number_generator_templates ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("templates", e))?;
        rows.iter()
            .map(|row| -> Result<NumberGeneratorTemplate, sqlx::Error> {
                Ok(NumberGeneratorTemplate {
                    id: TemplateId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    template: row.try_get("template")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self), err)]
    async fn price_lists(&mut self) -> Result<Vec<PriceList>, StoreError> {
        let rows = sqlx::query("SELECT id, name, currency FROM price_lists ORDER BY name")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("price_lists", e))?;
        rows.iter()
            .map(|row| -> Result<PriceList, sqlx::Error> {
                Ok(PriceList {
                    id: PriceListId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    currency: row.try_get("currency")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self), err)]
    async fn attribute_models(&mut self) -> Result<Vec<AttributeModel>, StoreError> {
        let rows = sqlx::query("SELECT id, name, use_case FROM attribute_models ORDER BY use_case")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("attribute_models", e))?;
        rows.iter()
            .map(|row| -> Result<AttributeModel, sqlx::Error> {
                Ok(AttributeModel {
                    id: AttributeModelId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    use_case: row.try_get("use_case")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self), fields(attributes_data_id = %id), err)]
    async fn attribute_data(&mut self, id: AttributeDataId) -> Result<Option<AttributeData>, StoreError> {
        let row = sqlx::query(r#"SELECT id, model_id, "values" FROM attribute_data WHERE id = $1"#)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("attribute_data", e))?;
        row.map(|row| -> Result<AttributeData, sqlx::Error> {
            Ok(AttributeData {
                id: AttributeDataId::from_uuid(row.try_get("id")?),
                model_id: AttributeModelId::from_uuid(row.try_get("model_id")?),
                values: row.try_get("values")?,
            })
        })
        .transpose()
        .map_err(decode)
    }

    #[instrument(skip(self, data), fields(attributes_data_id = %data.id), err)]
    async fn insert_attribute_data(&mut self, data: &AttributeData) -> Result<(), StoreError> {
        sqlx::query(r#"INSERT INTO attribute_data (id, model_id, "values") VALUES ($1, $2, $3)"#)
            .bind(data.id.as_uuid())
            .bind(data.model_id.as_uuid())
            .bind(&data.values)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_attribute_data", e))?;
        Ok(())
    }

    #[instrument(skip(self, data), fields(attributes_data_id = %data.id), err)]
    async fn update_attribute_data(&mut self, data: &AttributeData) -> Result<(), StoreError> {
        let result = sqlx::query(r#"UPDATE attribute_data SET model_id = $2, "values" = $3 WHERE id = $1"#)
            .bind(data.id.as_uuid())
            .bind(data.model_id.as_uuid())
            .bind(&data.values)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_attribute_data", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("attribute data", data.id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(attributes_data_id = %id), err)]
    async fn delete_attribute_data(&mut self, id: AttributeDataId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM attribute_data WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_attribute_data", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let mut query = QueryBuilder::new(PRODUCT_SELECT);
        query.push(" WHERE p.id = ").push_bind(*id.as_uuid());
        Ok(self.fetch_products(query).await?.into_iter().next())
    }

    #[instrument(skip(self), err)]
    async fn product_by_code(&mut self, code: &str) -> Result<Option<Product>, StoreError> {
        let mut query = QueryBuilder::new(PRODUCT_SELECT);
        query.push(" WHERE p.code = ").push_bind(code.to_string());
        Ok(self.fetch_products(query).await?.into_iter().next())
    }

    #[instrument(skip(self), err)]
    async fn products(&mut self, selection: &ProductSelection) -> Result<Vec<Product>, StoreError> {
        let mut query = QueryBuilder::new(PRODUCT_SELECT);
        match selection {
            ProductSelection::All => {}
            ProductSelection::Ids(ids) => {
                let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
                query.push(" WHERE p.id = ANY(").push_bind(ids).push(")");
            }
            ProductSelection::Codes(codes) => {
                query.push(" WHERE p.code = ANY(").push_bind(codes.clone()).push(")");
            }
        }
        query.push(r#" ORDER BY p.name COLLATE "C", p.id"#);
        self.fetch_products(query).await
    }

    #[instrument(skip(self), err)]
    async fn code_taken(&mut self, code: &str, except: Option<ProductId>) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM products WHERE code = $1 AND ($2::uuid IS NULL OR id <> $2)
            ) AS taken
            "#,
        )
        .bind(code)
        .bind(except.map(|id| *id.as_uuid()))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("code_taken", e))?;
        row.try_get("taken").map_err(decode)
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn insert_product(&mut self, product: &mut Product) -> Result<u64, StoreError> {
        let version = product.version() + 1;
        bind_product(sqlx::query(PRODUCT_INSERT), product.data(), version)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        self.write_children(product.data()).await?;
        Ok(product.mark_saved())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed(), version = product.version()), err)]
    async fn update_product(&mut self, product: &mut Product) -> Result<u64, StoreError> {
        let loaded_version = product.version();
        let result = bind_product(sqlx::query(PRODUCT_UPDATE), product.data(), loaded_version + 1)
            .bind(loaded_version as i64)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            let id = product.id_typed();
            let stored: Option<i64> = sqlx::query_scalar("SELECT version FROM products WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_product", e))?;
            return Err(match stored {
                Some(stored) => StoreError::Conflict(format!(
                    "product {id} is at version {stored}, not {loaded_version}"
                )),
                None => StoreError::not_found("product", id),
            });
        }

        self.write_children(product.data()).await?;
        Ok(product.mark_saved())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn plu_variants(&mut self, product_id: ProductId) -> Result<Vec<PluVariant>, StoreError> {
        let rows = sqlx::query("SELECT id, plu_id, code FROM plu_variants WHERE plu_id = $1 ORDER BY code")
            .bind(product_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("plu_variants", e))?;
        rows.iter()
            .map(|row| -> Result<PluVariant, sqlx::Error> {
                Ok(PluVariant {
                    id: PluVariantId::from_uuid(row.try_get("id")?),
                    plu_id: ProductId::from_uuid(row.try_get("plu_id")?),
                    code: row.try_get("code")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(decode)
    }

    #[instrument(skip(self, variant), fields(product_id = %variant.plu_id), err)]
    async fn insert_plu_variant(&mut self, variant: &PluVariant) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO plu_variants (id, plu_id, code) VALUES ($1, $2, $3)")
            .bind(variant.id.as_uuid())
            .bind(variant.plu_id.as_uuid())
            .bind(variant.code.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_plu_variant", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn delete_plu_variants(&mut self, product_id: ProductId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM plu_variants WHERE plu_id = $1")
            .bind(product_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_plu_variants", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, query), fields(page = query.page, page_size = query.page_size), err)]
    async fn product_page(&mut self, query: &DataTableQuery) -> Result<(Vec<ProductRow>, u64), StoreError> {
        const FROM: &str = " FROM products p LEFT JOIN product_categories c ON c.id = p.category_id WHERE TRUE";

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total");
        count.push(FROM);
        push_filters(&mut count, &query.filters);
        let total: i64 = count
            .build()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?
            .try_get("total")
            .map_err(decode)?;

        let mut page = QueryBuilder::<Postgres>::new(
            "SELECT p.id, p.name, p.code, p.product_type, c.name AS category_name, p.catalog_number",
        );
        page.push(FROM);
        push_filters(&mut page, &query.filters);
        page.push(" ORDER BY ")
            .push(sort_expression(query.sort))
            .push(match query.direction {
                SortDirection::Asc => " ASC NULLS LAST",
                SortDirection::Desc => " DESC NULLS LAST",
            })
            .push(", p.id ASC LIMIT ")
            .push_bind(query.limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let rows = page
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("product_page", e))?;

        let rows = rows
            .iter()
            .map(|row| -> Result<ProductRow, sqlx::Error> {
                let product_type: String = row.try_get("product_type")?;
                Ok(ProductRow {
                    id: ProductId::from_uuid(row.try_get("id")?),
                    name: row.try_get("name")?,
                    code: row.try_get("code")?,
                    product_type: product_type.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
                    category_name: row.try_get("category_name")?,
                    catalog_number: row.try_get("catalog_number")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(decode)?;

        Ok((rows, total.max(0) as u64))
    }

    #[instrument(skip(self), err)]
    async fn next_sequence(&mut self, name: &str) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("next_sequence", e))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }
}

/// Only whitelisted expressions reach the ORDER BY clause.
fn sort_expression(column: ProductColumn) -> &'static str {
    match column {
        ProductColumn::Name => r#"p.name COLLATE "C""#,
        ProductColumn::Code => r#"p.code COLLATE "C""#,
        ProductColumn::ProductType => r#"p.product_type COLLATE "C""#,
        ProductColumn::CategoryName => r#"c.name COLLATE "C""#,
        ProductColumn::CatalogNumber => r#"p.catalog_number COLLATE "C""#,
    }
}

fn text_expression(field: TextField) -> &'static str {
    match field {
        TextField::CategoryName => "c.name",
        TextField::Name => "p.name",
        TextField::Code => "p.code",
        TextField::CatalogNumber => "p.catalog_number",
        TextField::PkwiuCode => "p.pkwiu_code",
        TextField::CnCode => "p.cn_code",
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filters: &[ProductFilter]) {
    for filter in filters {
        query.push(" AND ");
        match filter {
            ProductFilter::Contains(field, needle) => {
                query
                    .push(text_expression(*field))
                    .push(" ILIKE ")
                    .push_bind(format!("%{}%", escape_like(needle)));
            }
            ProductFilter::ProductType(t) => {
                query.push("p.product_type = ").push_bind(t.as_str());
            }
            ProductFilter::WarehousingStrategy(w) => {
                query.push("p.warehousing_strategy = ").push_bind(w.as_str());
            }
            ProductFilter::IsFreezable(b) => {
                query.push("p.is_freezable = ").push_bind(*b);
            }
            ProductFilter::IsPerishable(b) => {
                query.push("p.is_perishable = ").push_bind(*b);
            }
            ProductFilter::Created(range) | ProductFilter::LastModified(range) => {
                let column = match filter {
                    ProductFilter::Created(_) => "p.created_at",
                    _ => "p.last_modified",
                };
                query.push("TRUE");
                if let Some(from) = range.from {
                    query.push(" AND ").push(column).push(" >= ").push_bind(from);
                }
                if let Some(to) = range.to {
                    query.push(" AND ").push(column).push(" <= ").push_bind(to);
                }
            }
        }
    }
}

/// Escape `LIKE` wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn measure(row: &PgRow, column: &str) -> Result<Measure, sqlx::Error> {
    let text: String = row.try_get(column)?;
    text.parse::<Measure>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn decode(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

/// Property name reported for a violated unique constraint.
fn unique_property(constraint: Option<&str>) -> String {
    match constraint {
        Some("products_code_key") => "code",
        Some("product_alternative_units_target_key") => "alternative_units",
        Some("product_prices_pkey") => "prices",
        Some(other) => other,
        None => "id",
    }
    .to_string()
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(unique_property(db_err.constraint())),
                Some("23503") => StoreError::ForeignKey(message),
                Some("23514") => StoreError::Database {
                    operation,
                    message: format!("check constraint violated: {message}"),
                },
                _ => StoreError::Database { operation, message },
            }
        }
        sqlx::Error::PoolClosed => StoreError::Database {
            operation,
            message: "connection pool closed".to_string(),
        },
        other => StoreError::Database {
            operation,
            message: other.to_string(),
        },
    }
}

struct ProductRecord {
    data: ProductData,
    version: u64,
}

impl<'r> FromRow<'r, PgRow> for ProductRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let parse_err = |e: catalog_core::DomainError| sqlx::Error::Decode(Box::new(e));
        let image = match (
            row.try_get::<Option<String>, _>("image_file_name")?,
            row.try_get::<Option<Vec<u8>>, _>("image_content")?,
        ) {
            (Some(file_name), Some(content)) => Some(ProductImage { file_name, content }),
            _ => None,
        };
        let version: i64 = row.try_get("version")?;
        let product_type: String = row.try_get("product_type")?;
        let warehousing_strategy: String = row.try_get("warehousing_strategy")?;

        let data = ProductData {
            id: ProductId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            code: row.try_get("code")?,
            product_type: product_type.parse().map_err(parse_err)?,
            category_id: row.try_get::<Option<Uuid>, _>("category_id")?.map(CategoryId::from_uuid),
            base_unit_id: UnitId::from_uuid(row.try_get("base_unit_id")?),
            weight_unit_id: row.try_get::<Option<Uuid>, _>("weight_unit_id")?.map(UnitId::from_uuid),
            size_unit_id: row.try_get::<Option<Uuid>, _>("size_unit_id")?.map(UnitId::from_uuid),
            warehousing_strategy: warehousing_strategy.parse().map_err(parse_err)?,
            image,
            description: row.try_get("description")?,
            catalog_number: row.try_get("catalog_number")?,
            pkwiu_code: row.try_get("pkwiu_code")?,
            cn_code: row.try_get("cn_code")?,
            alternative_units: Vec::new(),
            prices: Vec::new(),
            number_generator_template_id: row
                .try_get::<Option<Uuid>, _>("number_generator_template_id")?
                .map(TemplateId::from_uuid),
            quantity_input_modes: InputModes::from_bits(row.try_get("quantity_input_modes")?),
            has_weight: row.try_get("has_weight")?,
            weight_input_modes: InputModes::from_bits(row.try_get("weight_input_modes")?),
            has_size: row.try_get("has_size")?,
            size_input_modes: InputModes::from_bits(row.try_get("size_input_modes")?),
            net_weight: measure(row, "net_weight")?,
            tare: measure(row, "tare")?,
            width: measure(row, "width")?,
            height: measure(row, "height")?,
            depth: measure(row, "depth")?,
            default_use_by_days: row.try_get("default_use_by_days")?,
            default_freeze_days: row.try_get("default_freeze_days")?,
            quantity_step: row.try_get("quantity_step")?,
            default_quantity: measure(row, "default_quantity")?,
            is_freezable: row.try_get("is_freezable")?,
            is_perishable: row.try_get("is_perishable")?,
            min_weight: row.try_get("min_weight")?,
            max_weight: row.try_get("max_weight")?,
            min_storage_temperature: row.try_get("min_storage_temperature")?,
            max_storage_temperature: row.try_get("max_storage_temperature")?,
            purchase_tax_rate_id: TaxRateId::from_uuid(row.try_get("purchase_tax_rate_id")?),
            sales_tax_rate_id: TaxRateId::from_uuid(row.try_get("sales_tax_rate_id")?),
            attributes_data_id: row
                .try_get::<Option<Uuid>, _>("attributes_data_id")?
                .map(AttributeDataId::from_uuid),
            handling_unit_item_data_model_id: row
                .try_get::<Option<Uuid>, _>("handling_unit_item_data_model_id")?
                .map(AttributeModelId::from_uuid),
            created_at: row.try_get("created_at")?,
            last_modified: row.try_get("last_modified")?,
        };

        Ok(Self {
            data,
            version: version.max(0) as u64,
        })
    }
}
