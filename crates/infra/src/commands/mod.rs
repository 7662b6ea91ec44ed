//! State-changing catalog operations.

use serde::{Deserialize, Serialize};

use catalog_products::ProductId;

pub mod add_product;
pub mod change_price_list;
pub mod change_product;
pub mod delete_product;
pub mod product_fields;

pub use add_product::AddProductRequest;
pub use change_price_list::ChangeProductPriceListRequest;
pub use change_product::ChangeProductRequest;
pub use delete_product::DeleteProductRequest;
pub use product_fields::{AlternativeUnitInput, AttributeValue, ImageUpload, ProductFields};

/// Id of the created or changed product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResult {
    pub id: ProductId,
}

fn default_product_type() -> catalog_products::ProductType {
    catalog_products::ProductType::Good
}
