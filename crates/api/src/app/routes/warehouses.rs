use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use stockledger_core::{PositionId, WarehouseId};

use crate::app::extract::ApiJson;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/stats", get(warehouse_stats))
        .route("/:id/positions", post(create_position))
}

pub async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.ledger.list_warehouses().await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateWarehouseRequest>,
) -> axum::response::Response {
    match services.ledger.create_warehouse(body.name).await {
        Ok(warehouse) => (StatusCode::CREATED, Json(warehouse)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn create_position(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::CreatePositionRequest>,
) -> axum::response::Response {
    let warehouse_id: WarehouseId = match dto::parse_id(&id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .ledger
        .create_position(warehouse_id, body.name, body.capacity)
        .await
    {
        Ok(position) => (StatusCode::CREATED, Json(position)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn warehouse_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.views.warehouse_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn update_position_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::PositionUsageRequest>,
) -> axum::response::Response {
    let position_id: PositionId = match dto::parse_id(&id, "warehouse position") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let action = match dto::parse_position_action(&body.action) {
        Ok(a) => a,
        Err(resp) => return resp,
    };

    match services.ledger.update_position_usage(position_id, action).await {
        Ok(position) => (StatusCode::OK, Json(position)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
