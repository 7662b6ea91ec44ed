//! Read-only catalog queries.

pub mod data_table;
pub mod get_products;
pub mod price_list;
pub mod product_forms;

pub use data_table::{DataTableConfig, DataTablePage, DataTablePageRequest, GetProductsIndex};
pub use get_products::{
    GetAllProducts, GetManyProducts, GetManyProductsByCodes, GetProductByCode, GetProductById, ProductResponse,
};
pub use price_list::{GetMissingPriceListEntries, GetProductPriceListForm, MissingPriceListEntries, ProductPriceListForm};
pub use product_forms::{AddProductForm, ChangeProductForm, GetAddProductForm, GetChangeProductForm};
