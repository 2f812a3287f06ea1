use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use stockledger_api::app::{router_with, services::AppServices};
use stockledger_infra::config::AppConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over in-memory services, bound to an ephemeral port.
        let services = AppServices::in_memory(&AppConfig::default()).expect("wire services");
        let app = router_with(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.put(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Warehouse with a single position of `capacity`; returns the position id.
    async fn position(&self, capacity: u32) -> String {
        let (status, warehouse) = self.post("/warehouses", json!({ "name": "Osaka" })).await;
        assert_eq!(status, StatusCode::CREATED);
        let wid = warehouse["id"].as_str().unwrap();

        let (status, position) = self
            .post(
                &format!("/warehouses/{wid}/positions"),
                json!({ "name": "S-01", "capacity": capacity }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        position["id"].as_str().unwrap().to_string()
    }

    async fn create_item(&self, body: Value) -> String {
        let (status, created) = self.post("/items", body).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {created}");
        created["item"]["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn sold_item(name: &str) -> Value {
    json!({
        "name": name,
        "purchasePrice": { "amount": "300", "currency": "CNY", "rate": "1" },
        "soldPrice": { "amount": "10000", "currency": "JPY", "rate": "0.05" },
    })
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn item_lifecycle_create_update_delete() {
    let srv = TestServer::spawn().await;

    let id = srv.create_item(sold_item("Gundam RX-78")).await;
    let (status, record) = srv.get(&format!("/items/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["item"]["details"]["name"], "Gundam RX-78");
    assert_eq!(record["transaction"]["orderStatus"], "在途（国内）");

    let (status, updated) = srv
        .put(&format!("/items/{id}"), json!({ "orderStatus": "已上架" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["transaction"]["orderStatus"], "已上架");

    let res = srv.client.delete(srv.url(&format!("/items/{id}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = srv.get(&format!("/items/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn full_position_rejects_new_items() {
    let srv = TestServer::spawn().await;
    let position = srv.position(1).await;

    srv.create_item(json!({ "name": "first", "warehousePositionId": position }))
        .await;
    let (status, body) = srv
        .post("/items", json!({ "name": "second", "warehousePositionId": position }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "capacity_exceeded");

    let (_, stats) = srv.get("/warehouses/stats").await;
    assert_eq!(stats["totalUsed"], 1);
    assert_eq!(stats["fullPositions"], 1);
}

#[tokio::test]
async fn batch_settlement_counts_each_item() {
    let srv = TestServer::spawn().await;

    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        ids.push(srv.create_item(sold_item(name)).await);
    }
    for id in &ids[..2] {
        let (status, _) = srv
            .put(&format!("/items/{id}"), json!({ "orderStatus": "已售出未结算" }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, outcome) = srv
        .post("/settlement", json!({ "itemIds": ids, "exchangeRate": 0.05 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({ "successCount": 2, "errorCount": 1 }));

    let (_, settled) = srv.get(&format!("/items/{}", ids[0])).await;
    assert_eq!(settled["transaction"]["orderStatus"], "已完成");
    assert_eq!(settled["transaction"]["itemNetProfit"], "200");

    let (_, untouched) = srv.get(&format!("/items/{}", ids[2])).await;
    assert_eq!(untouched["transaction"]["orderStatus"], "在途（国内）");

    let (_, stats) = srv.get("/stats").await;
    assert_eq!(stats["soldCount"], 2);
    assert_eq!(stats["totalItems"], 3);
}

#[tokio::test]
async fn settlement_rejects_empty_selection() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv
        .post("/settlement", json!({ "itemIds": [], "exchangeRate": 0.05 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn stock_adjustment_clamps_and_validates() {
    let srv = TestServer::spawn().await;
    let id = srv.create_item(json!({ "name": "figure" })).await;

    let (status, body) = srv
        .post(
            "/stock/adjust",
            json!({ "itemId": id, "adjustmentType": "subtract", "quantity": 10, "currentStock": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newStock"], 0);
    assert!(body["adjustmentId"].is_string());

    let (status, body) = srv
        .post(
            "/stock/adjust",
            json!({ "itemId": id, "adjustmentType": "multiply", "quantity": 2, "currentStock": 4 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn manual_position_usage_respects_bounds() {
    let srv = TestServer::spawn().await;
    let position = srv.position(1).await;
    let path = format!("/warehouse-position/{position}");

    let (status, _) = srv.put(&path, json!({ "action": "remove" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = srv.put(&path, json!({ "action": "add" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 1);

    let (status, body) = srv.put(&path, json!({ "action": "add" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "capacity_exceeded");

    let (status, _) = srv.put("/warehouse-position/not-a-uuid", json!({ "action": "add" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cache_invalidation_defaults_to_every_tag() {
    let srv = TestServer::spawn().await;

    let res = srv.client.post(srv.url("/cache/invalidate")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["invalidated"],
        json!(["items", "stats", "months", "warehouses"])
    );

    let (status, body) = srv
        .post("/cache/invalidate", json!({ "tags": ["stats"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], json!(["stats"]));

    let (status, _) = srv
        .post("/cache/invalidate", json!({ "tags": ["bogus"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn copy_occupies_another_slot() {
    let srv = TestServer::spawn().await;
    let position = srv.position(2).await;
    let id = srv
        .create_item(json!({ "name": "original", "warehousePositionId": position }))
        .await;

    let (status, copy) = srv.post(&format!("/items/{id}/copy"), json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(copy["item"]["id"], json!(id));
    assert_eq!(copy["transaction"]["soldPrice"]["currency"], "JPY");

    let (status, _) = srv.post(&format!("/items/{id}/copy"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = srv.get("/items").await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_invalidate_body_is_rejected() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post("/cache/invalidate", json!({ "tags": "stats" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let res = srv
        .client
        .post(srv.url("/cache/invalidate"))
        .header("content-type", "application/json")
        .body("{tags")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bodies_accept_numbers_and_reject_malformed_json() {
    let srv = TestServer::spawn().await;

    let id = srv
        .create_item(json!({
            "name": "numeric",
            "purchasePrice": { "amount": 300, "currency": "CNY", "rate": 1 },
            "soldPrice": { "amount": 10000, "currency": "JPY", "rate": "" },
            "domesticShipping": 20,
        }))
        .await;
    let (status, _) = srv
        .put(&format!("/items/{id}"), json!({ "orderStatus": "已售出未结算" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, outcome) = srv
        .post("/settlement", json!({ "itemIds": [id], "exchangeRate": "0.05" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["successCount"], 1);
    let (_, settled) = srv.get(&format!("/items/{id}")).await;
    assert_eq!(settled["transaction"]["itemNetProfit"], "180");

    let res = srv
        .client
        .post(srv.url("/items"))
        .header("content-type", "application/json")
        .body(r#"{"name": "#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let (status, body) = srv
        .post("/settlement", json!({ "itemIds": [id], "exchangeRate": "fast" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn sku_intake_then_appended_transactions() {
    let srv = TestServer::spawn().await;

    let (status, sku) = srv
        .post("/items/sku", json!({ "itemId": "SKU-1001", "name": "Rider belt" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "sku intake failed: {sku}");
    assert_eq!(sku["item"]["id"], "SKU-1001");
    assert!(sku["transaction"].is_null());

    let (status, first) = srv
        .post(
            "/items/SKU-1001/transactions",
            json!({ "purchasePrice": { "amount": "120", "currency": "CNY", "rate": "1" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = srv
        .post(
            "/items/SKU-1001/transactions",
            json!({ "orderStatus": "已售出未结算" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(first["transaction"]["id"], second["transaction"]["id"]);

    let (_, record) = srv.get("/items/SKU-1001").await;
    assert_eq!(record["transaction"]["id"], second["transaction"]["id"]);
    assert_eq!(record["transaction"]["orderStatus"], "已售出未结算");

    let (status, _) = srv.post("/items/SKU-1001", json!({})).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, body) = srv
        .post("/items/NOPE-1/transactions", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
