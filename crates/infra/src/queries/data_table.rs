//! Sortable, filterable, paged product table.
//!
//! The client first asks for the table configuration (`get-index`), then
//! pages through rows with [`DataTablePageRequest`]s. Requests name columns
//! and filters by string; they are parsed into a typed [`DataTableQuery`]
//! before any store sees them, so only known columns ever reach SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use catalog_core::ValidationSummary;
use catalog_products::{ProductData, ProductId, ProductType, WarehousingStrategy};

use crate::command_dispatcher::{CatalogQuery, DispatchError};
use crate::settings::ProductSettings;
use crate::store::CatalogTx;

pub const DATA_URL: &str = "/products/products/get-index-data";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequest {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    pub column: String,
    pub value: JsonValue,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTablePageRequest {
    /// 1-based.
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub sort: Option<SortRequest>,
    #[serde(default)]
    pub filters: Vec<FilterRequest>,
}

impl Default for DataTablePageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
            sort: None,
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub product_type: ProductType,
    pub category_name: Option<String>,
    pub catalog_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTablePage {
    pub rows: Vec<ProductRow>,
    pub page: u32,
    pub page_size: u32,
    pub total_rows: u64,
    pub total_pages: u64,
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductColumn {
    Name,
    Code,
    ProductType,
    CategoryName,
    CatalogNumber,
}

impl ProductColumn {
    pub const ALL: [ProductColumn; 5] = [
        Self::Name,
        Self::Code,
        Self::ProductType,
        Self::CategoryName,
        Self::CatalogNumber,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Code => "code",
            Self::ProductType => "product_type",
            Self::CategoryName => "category_name",
            Self::CatalogNumber => "catalog_number",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// Free-text columns filtered with a case-insensitive "contains".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    CategoryName,
    Name,
    Code,
    CatalogNumber,
    PkwiuCode,
    CnCode,
}

impl TextField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CategoryName => "category_name",
            Self::Name => "name",
            Self::Code => "code",
            Self::CatalogNumber => "catalog_number",
            Self::PkwiuCode => "pkwiu_code",
            Self::CnCode => "cn_code",
        }
    }
}

/// Inclusive timestamp range; an open end is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProductFilter {
    Contains(TextField, String),
    ProductType(ProductType),
    WarehousingStrategy(WarehousingStrategy),
    IsFreezable(bool),
    IsPerishable(bool),
    Created(DateRange),
    LastModified(DateRange),
}

impl ProductFilter {
    /// Evaluate the filter against a product (used by the in-memory store).
    pub fn matches(&self, data: &ProductData, category_name: Option<&str>) -> bool {
        match self {
            ProductFilter::Contains(field, needle) => {
                let haystack = match field {
                    TextField::CategoryName => category_name,
                    TextField::Name => Some(data.name.as_str()),
                    TextField::Code => Some(data.code.as_str()),
                    TextField::CatalogNumber => data.catalog_number.as_deref(),
                    TextField::PkwiuCode => data.pkwiu_code.as_deref(),
                    TextField::CnCode => data.cn_code.as_deref(),
                };
                haystack.is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
            }
            ProductFilter::ProductType(t) => data.product_type == *t,
            ProductFilter::WarehousingStrategy(w) => data.warehousing_strategy == *w,
            ProductFilter::IsFreezable(b) => data.is_freezable == *b,
            ProductFilter::IsPerishable(b) => data.is_perishable == *b,
            ProductFilter::Created(range) => range.contains(data.created_at),
            ProductFilter::LastModified(range) => range.contains(data.last_modified),
        }
    }
}

/// Parsed, validated page request.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTableQuery {
    pub filters: Vec<ProductFilter>,
    pub sort: ProductColumn,
    pub direction: SortDirection,
    pub page: u32,
    pub page_size: u32,
}

impl DataTableQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

impl Default for DataTableQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: ProductColumn::Name,
            direction: SortDirection::Asc,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl DataTablePageRequest {
    pub fn parse(&self) -> Result<DataTableQuery, ValidationSummary> {
        let mut summary = ValidationSummary::new();
        let mut query = DataTableQuery::default();

        if self.page == 0 {
            summary.add("page", "must be 1 or greater");
        }
        query.page = self.page.max(1);

        match self.page_size {
            Some(size) if size == 0 || size > MAX_PAGE_SIZE => {
                summary.add("page_size", format!("must be between 1 and {MAX_PAGE_SIZE}"));
            }
            Some(size) => query.page_size = size,
            None => {}
        }

        if let Some(sort) = &self.sort {
            match ProductColumn::parse(&sort.column) {
                Some(column) => {
                    query.sort = column;
                    query.direction = sort.direction;
                }
                None => summary.add("sort.column", format!("unknown or unsortable column: {}", sort.column)),
            }
        }

        for (i, filter) in self.filters.iter().enumerate() {
            match parse_filter(filter) {
                Ok(Some(parsed)) => query.filters.push(parsed),
                Ok(None) => {}
                Err(message) => summary.add(format!("filters[{i}]"), message),
            }
        }

        if summary.is_valid() { Ok(query) } else { Err(summary) }
    }
}

/// `Ok(None)` for filters that are present but empty (e.g. blank text).
fn parse_filter(filter: &FilterRequest) -> Result<Option<ProductFilter>, String> {
    let value = &filter.value;
    if value.is_null() {
        return Ok(None);
    }

    let text = |field: TextField| -> Result<Option<ProductFilter>, String> {
        let s = value.as_str().ok_or_else(|| format!("{} filter expects a string", field.as_str()))?;
        let s = s.trim();
        Ok((!s.is_empty()).then(|| ProductFilter::Contains(field, s.to_string())))
    };
    let boolean = || value.as_bool().ok_or_else(|| format!("{} filter expects a boolean", filter.column));
    let range = || {
        serde_json::from_value::<DateRange>(value.clone())
            .map_err(|e| format!("{} filter expects {{from, to}}: {e}", filter.column))
    };
    let enumeration = || value.as_str().ok_or_else(|| format!("{} filter expects a string", filter.column));

    let parsed = match filter.column.as_str() {
        "category_name" => return text(TextField::CategoryName),
        "name" => return text(TextField::Name),
        "code" => return text(TextField::Code),
        "catalog_number" => return text(TextField::CatalogNumber),
        "pkwiu_code" => return text(TextField::PkwiuCode),
        "cn_code" => return text(TextField::CnCode),
        "product_type" => ProductFilter::ProductType(enumeration()?.parse().map_err(|e| format!("{e}"))?),
        "warehousing_strategy" => {
            ProductFilter::WarehousingStrategy(enumeration()?.parse().map_err(|e| format!("{e}"))?)
        }
        "is_freezable" => ProductFilter::IsFreezable(boolean()?),
        "is_perishable" => ProductFilter::IsPerishable(boolean()?),
        "created_at" => ProductFilter::Created(range()?),
        "last_modified" => ProductFilter::LastModified(range()?),
        other => return Err(format!("unknown filter column: {other}")),
    };
    Ok(Some(parsed))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnConfig {
    pub name: &'static str,
    pub sortable: bool,
    /// Carried in every row but not displayed.
    pub internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Text,
    Select,
    Boolean,
    DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterConfig {
    pub column: &'static str,
    pub kind: FilterKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataTableConfig {
    pub data_url: &'static str,
    pub id_column: &'static str,
    pub columns: Vec<ColumnConfig>,
    pub filters: Vec<FilterConfig>,
    pub default_sort: SortRequest,
    pub default_page_size: u32,
}

pub fn table_config() -> DataTableConfig {
    let column = |name, sortable, internal| ColumnConfig { name, sortable, internal };
    let filter = |column, kind| FilterConfig { column, kind, options: Vec::new() };

    DataTableConfig {
        data_url: DATA_URL,
        id_column: "id",
        columns: vec![
            column("id", false, true),
            column("name", true, false),
            column("code", true, false),
            column("product_type", true, false),
            column("category_name", true, false),
            column("catalog_number", true, false),
        ],
        filters: vec![
            filter("category_name", FilterKind::Text),
            filter("name", FilterKind::Text),
            filter("code", FilterKind::Text),
            FilterConfig {
                column: "product_type",
                kind: FilterKind::Select,
                options: ProductType::ALL.iter().map(|t| t.as_str()).collect(),
            },
            FilterConfig {
                column: "warehousing_strategy",
                kind: FilterKind::Select,
                options: WarehousingStrategy::ALL.iter().map(|w| w.as_str()).collect(),
            },
            filter("is_freezable", FilterKind::Boolean),
            filter("is_perishable", FilterKind::Boolean),
            filter("catalog_number", FilterKind::Text),
            filter("pkwiu_code", FilterKind::Text),
            filter("cn_code", FilterKind::Text),
            filter("created_at", FilterKind::DateRange),
            filter("last_modified", FilterKind::DateRange),
        ],
        default_sort: SortRequest {
            column: ProductColumn::Name.as_str().to_string(),
            direction: SortDirection::Asc,
        },
        default_page_size: DEFAULT_PAGE_SIZE,
    }
}

/// Query: table configuration.
#[derive(Debug, Clone, Default)]
pub struct GetProductsIndex;

#[async_trait]
impl CatalogQuery for GetProductsIndex {
    type Output = DataTableConfig;
    const NAME: &'static str = "products.get_index";

    async fn execute(&self, _tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<DataTableConfig, DispatchError> {
        Ok(table_config())
    }
}

#[async_trait]
impl CatalogQuery for DataTablePageRequest {
    type Output = DataTablePage;
    const NAME: &'static str = "products.get_index_data";

    async fn execute(&self, tx: &mut dyn CatalogTx, _settings: &ProductSettings) -> Result<DataTablePage, DispatchError> {
        let query = self.parse().map_err(DispatchError::Validation)?;
        let (rows, total_rows) = tx.product_page(&query).await?;
        let page_size = u64::from(query.page_size);

        Ok(DataTablePage {
            rows,
            page: query.page,
            page_size: query.page_size,
            total_rows,
            total_pages: total_rows.div_ceil(page_size),
        })
    }
}
