use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use stockledger_infra::services::StockAdjustmentRequest;

use crate::app::extract::ApiJson;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn settle(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::SettlementRequest>,
) -> axum::response::Response {
    match services
        .settlement
        .settle_batch(&body.item_ids, body.exchange_rate)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<StockAdjustmentRequest>,
) -> axum::response::Response {
    match services.ledger.adjust_stock(body).await {
        Ok(adjustment) => (
            StatusCode::OK,
            Json(dto::StockAdjustResponse::from(&adjustment)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Maintenance hook: drop cached views by tag (all tags for an empty body).
pub async fn invalidate_cache(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    let tags = match dto::parse_invalidate_body(&body) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    services.views.invalidate(&tags).await;
    info!(tags = ?tags, "cache invalidated on request");

    (
        StatusCode::OK,
        Json(dto::InvalidatedResponse {
            invalidated: tags.iter().map(|t| t.as_str()).collect(),
        }),
    )
        .into_response()
}

pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.views.stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn months(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.views.months().await {
        Ok(months) => (StatusCode::OK, Json(months)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
