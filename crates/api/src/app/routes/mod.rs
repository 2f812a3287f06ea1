use axum::{
    Router,
    routing::{get, post, put},
};

pub mod items;
pub mod ledger;
pub mod system;
pub mod warehouses;

/// Router for every ledger endpoint (health is mounted separately).
pub fn router() -> Router {
    Router::new()
        .nest("/items", items::router())
        .nest("/warehouses", warehouses::router())
        .route("/warehouse-position/:id", put(warehouses::update_position_usage))
        .route("/settlement", post(ledger::settle))
        .route("/stock/adjust", post(ledger::adjust_stock))
        .route("/cache/invalidate", post(ledger::invalidate_cache))
        .route("/stats", get(ledger::stats))
        .route("/months", get(ledger::months))
}
