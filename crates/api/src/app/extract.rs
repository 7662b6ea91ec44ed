//! JSON body extractor that reports malformed fields the same way command
//! validation does: `400` with a `ValidationSummary` naming the property.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use catalog_core::ValidationSummary;
use catalog_infra::DispatchError;
use catalog_infra::commands::{
    AddProductRequest, ChangeProductPriceListRequest, ChangeProductRequest, DeleteProductRequest, ProductFields,
};
use catalog_infra::queries::{
    DataTablePageRequest, GetChangeProductForm, GetManyProducts, GetManyProductsByCodes, GetMissingPriceListEntries,
    GetProductByCode, GetProductById, GetProductPriceListForm,
};

use crate::app::errors;

/// Request bodies accepted by the catalog routes.
pub trait CatalogBody: DeserializeOwned {
    /// Locate an error serde could only report at the root, which happens
    /// for fields merged in with `#[serde(flatten)]`.
    fn locate_error(_body: &JsonValue) -> Option<ValidationSummary> {
        None
    }
}

/// Errors raised inside the flattened product fields.
fn locate_in_product_fields(body: &JsonValue) -> Option<ValidationSummary> {
    serde_path_to_error::deserialize::<_, ProductFields>(body.clone())
        .err()
        .map(path_error_summary)
}

impl CatalogBody for AddProductRequest {
    fn locate_error(body: &JsonValue) -> Option<ValidationSummary> {
        locate_in_product_fields(body)
    }
}

impl CatalogBody for ChangeProductRequest {
    fn locate_error(body: &JsonValue) -> Option<ValidationSummary> {
        locate_in_product_fields(body)
    }
}

impl CatalogBody for DeleteProductRequest {}
impl CatalogBody for ChangeProductPriceListRequest {}
impl CatalogBody for DataTablePageRequest {}
impl CatalogBody for GetManyProducts {}
impl CatalogBody for GetManyProductsByCodes {}
impl CatalogBody for GetProductById {}
impl CatalogBody for GetProductByCode {}
impl CatalogBody for GetChangeProductForm {}
impl CatalogBody for GetProductPriceListForm {}
impl CatalogBody for GetMissingPriceListEntries {}

fn path_error_summary(err: serde_path_to_error::Error<serde_json::Error>) -> ValidationSummary {
    let path = err.path().to_string();
    let property = if path == "." { String::new() } else { path };
    ValidationSummary::single(property, err.into_inner().to_string())
}

/// `axum::Json` replacement whose rejection is a field-level `400`.
pub struct CatalogJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for CatalogJson<T>
where
    T: CatalogBody,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(IntoResponse::into_response)?;
        parse(&bytes)
            .map(CatalogJson)
            .map_err(|summary| errors::dispatch_error_to_response(DispatchError::Validation(summary)))
    }
}

fn parse<T: CatalogBody>(bytes: &[u8]) -> Result<T, ValidationSummary> {
    let body: JsonValue = serde_json::from_slice(bytes).map_err(|e| ValidationSummary::single("", e.to_string()))?;
    match serde_path_to_error::deserialize::<_, T>(body.clone()) {
        Ok(value) => Ok(value),
        Err(err) if err.path().iter().next().is_none() => {
            Err(T::locate_error(&body).unwrap_or_else(|| path_error_summary(err)))
        }
        Err(err) => Err(path_error_summary(err)),
    }
}
