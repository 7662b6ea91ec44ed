use std::sync::Arc;

use axum::{Extension, Json, Router, response::IntoResponse, routing::post};
use serde::Serialize;
use serde_json::json;

use catalog_infra::commands::{
    AddProductRequest, ChangeProductPriceListRequest, ChangeProductRequest, DeleteProductRequest,
};
use catalog_infra::queries::{
    DataTablePageRequest, GetAddProductForm, GetAllProducts, GetChangeProductForm, GetManyProducts,
    GetManyProductsByCodes, GetMissingPriceListEntries, GetProductByCode, GetProductById, GetProductPriceListForm,
    GetProductsIndex,
};
use catalog_infra::{CatalogCommand, CatalogQuery};

use crate::app::errors;
use crate::app::extract::CatalogJson;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/get-index", post(get_index))
        .route("/get-index-data", post(get_index_data))
        .route("/get-all", post(get_all))
        .route("/get-many", post(get_many))
        .route("/get-by-id", post(get_by_id))
        .route("/get-by-code", post(get_by_code))
        .route("/get-many-by-codes", post(get_many_by_codes))
        .route("/add/form", post(add_form))
        .route("/add", post(add))
        .route("/add/validation", post(add_validation))
        .route("/change/form", post(change_form))
        .route("/change", post(change))
        .route("/change/validation", post(change_validation))
        .route("/delete", post(delete))
        .route("/delete/validation", post(delete_validation))
        .route("/price-list", post(price_list))
        .route("/price-list/change", post(change_price_list))
        .route("/price-list/change/validation", post(change_price_list_validation))
        .route("/get-missing-entries", post(get_missing_entries))
}

async fn run_query<Q>(services: &AppServices, query: &Q) -> axum::response::Response
where
    Q: CatalogQuery,
    Q::Output: Serialize,
{
    match services.dispatcher.query(query).await {
        Ok(output) => Json(output).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

async fn run_command<C>(services: &AppServices, command: &C) -> axum::response::Response
where
    C: CatalogCommand,
    C::Output: Serialize,
{
    match services.dispatcher.dispatch(command).await {
        Ok(output) => Json(output).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Always 200 with the summary; an empty summary means the command would
/// be accepted.
async fn run_validation<C: CatalogCommand>(services: &AppServices, command: &C) -> axum::response::Response {
    match services.dispatcher.validate(command).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_index(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    run_query(&services, &GetProductsIndex).await
}

pub async fn get_index_data(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<DataTablePageRequest>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn get_all(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    run_query(&services, &GetAllProducts).await
}

pub async fn get_many(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetManyProducts>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetProductById>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn get_by_code(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetProductByCode>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn get_many_by_codes(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetManyProductsByCodes>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn add_form(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    run_query(&services, &GetAddProductForm).await
}

pub async fn add(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<AddProductRequest>,
) -> axum::response::Response {
    run_command(&services, &body).await
}

pub async fn add_validation(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<AddProductRequest>,
) -> axum::response::Response {
    run_validation(&services, &body).await
}

pub async fn change_form(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetChangeProductForm>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn change(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<ChangeProductRequest>,
) -> axum::response::Response {
    run_command(&services, &body).await
}

pub async fn change_validation(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<ChangeProductRequest>,
) -> axum::response::Response {
    run_validation(&services, &body).await
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<DeleteProductRequest>,
) -> axum::response::Response {
    match services.dispatcher.dispatch(&body).await {
        Ok(()) => Json(json!({})).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete_validation(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<DeleteProductRequest>,
) -> axum::response::Response {
    run_validation(&services, &body).await
}

pub async fn price_list(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetProductPriceListForm>,
) -> axum::response::Response {
    run_query(&services, &body).await
}

pub async fn change_price_list(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<ChangeProductPriceListRequest>,
) -> axum::response::Response {
    run_command(&services, &body).await
}

pub async fn change_price_list_validation(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<ChangeProductPriceListRequest>,
) -> axum::response::Response {
    run_validation(&services, &body).await
}

pub async fn get_missing_entries(
    Extension(services): Extension<Arc<AppServices>>,
    CatalogJson(body): CatalogJson<GetMissingPriceListEntries>,
) -> axum::response::Response {
    run_query(&services, &body).await
}
