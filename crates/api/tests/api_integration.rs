//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::{EventBus, InMemoryEventBus, RetryPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: axum::Router,
    state: Arc<AppState>,
}

impl TestApp {
    async fn new() -> Self {
        let bus: Arc<dyn EventBus> =
            Arc::new(InMemoryEventBus::with_policy(RetryPolicy::immediate(3)));
        api::bind_queues(bus.as_ref()).await.unwrap();
        let state = api::create_default_state(bus);
        let router = api::create_app(state.clone(), get_metrics_handle());
        Self { router, state }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Drains every queue until no consumer has work left.
    async fn settle(&self) {
        let workers = api::consumer_workers(&self.state, Duration::from_millis(10));
        loop {
            let mut processed = 0;
            for worker in &workers {
                processed += worker.run_until_idle().await.unwrap().processed();
            }
            if processed == 0 {
                break;
            }
        }
    }

    async fn create_farmer(&self) -> String {
        let (status, json) = self
            .send(
                "POST",
                "/farmers",
                Some(json!({
                    "name": "Ana Pérez",
                    "farm": "La Esperanza",
                    "location": "Tolima",
                    "email": "ana@example.com"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_str().unwrap().to_string()
    }

    async fn create_harvest(&self, farmer_id: &str, product: &str, quantity: &str) -> String {
        let (status, json) = self
            .send(
                "POST",
                "/harvests",
                Some(json!({
                    "farmer_id": farmer_id,
                    "product": product,
                    "quantity": quantity
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["id"].as_str().unwrap().to_string()
    }

    async fn create_item(&self, name: &str, stock: i64) -> String {
        let (status, json) = self
            .send(
                "POST",
                "/inventory/items",
                Some(json!({ "name": name, "stock": stock, "category": "supplies" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json["id"].as_str().unwrap().to_string()
    }
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, json) = app.send("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["queues"]["billing.harvest-in-process"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_harvest_choreography() {
    let app = TestApp::new().await;
    let seed_id = app.create_item("seed-rice", 1_000).await;
    let fertilizer_id = app.create_item("npk-fertilizer", 500).await;
    let farmer_id = app.create_farmer().await;

    // Registering the harvest consumes supplies.
    let harvest_id = app.create_harvest(&farmer_id, "ARROZ", "10").await;
    let (_, harvest) = app.send("GET", &format!("/harvests/{harvest_id}"), None).await;
    assert_eq!(harvest["state"], "REGISTERED");

    app.settle().await;

    let (_, seed) = app
        .send("GET", &format!("/inventory/items/{seed_id}"), None)
        .await;
    assert_eq!(seed["stock"], 950);
    let (_, fertilizer) = app
        .send("GET", &format!("/inventory/items/{fertilizer_id}"), None)
        .await;
    assert_eq!(fertilizer["stock"], 480);

    // Entering processing issues the invoice, which is linked back.
    let (status, harvest) = app
        .send("POST", &format!("/harvests/{harvest_id}/advance"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(harvest["state"], "IN_PROCESS");

    app.settle().await;

    let (status, invoice) = app
        .send("GET", &format!("/invoices/harvest/{harvest_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invoice["state"], "PENDING");
    assert_eq!(decimal(&invoice["subtotal"]), Decimal::from(25_000_000));
    assert_eq!(decimal(&invoice["tax_amount"]), Decimal::from(4_750_000));
    assert_eq!(decimal(&invoice["total"]), Decimal::from(29_750_000));
    assert_eq!(invoice["line_items"][0]["unit"], "Ton");

    let (_, harvest) = app.send("GET", &format!("/harvests/{harvest_id}"), None).await;
    assert_eq!(harvest["invoice_id"], invoice["id"]);

    // Asking for IN_PROCESS again issues nothing new.
    let (status, _) = app
        .send(
            "PUT",
            &format!("/harvests/{harvest_id}/state"),
            Some(json!({ "state": "in_process" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.settle().await;

    let (_, invoices) = app.send("GET", "/invoices", None).await;
    assert_eq!(invoices.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_harvest_validation_and_conflicts() {
    let app = TestApp::new().await;
    let farmer_id = app.create_farmer().await;

    let (status, json) = app
        .send(
            "POST",
            "/harvests",
            Some(json!({ "farmer_id": farmer_id, "product": "MAIZ", "quantity": "0" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Quantity"));

    for quantity in ["10000000000000000000000000", "1.00001"] {
        let (status, json) = app
            .send(
                "POST",
                "/harvests",
                Some(json!({ "farmer_id": farmer_id, "product": "MAIZ", "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("out of range"));
    }

    let harvest_id = app.create_harvest(&farmer_id, "MAIZ", "4.5").await;

    let (status, _) = app
        .send(
            "PUT",
            &format!("/harvests/{harvest_id}/state"),
            Some(json!({ "state": "shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.send("POST", &format!("/harvests/{harvest_id}/advance"), None)
        .await;
    let (status, json) = app
        .send("DELETE", &format!("/harvests/{harvest_id}"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_delete_registered_harvest() {
    let app = TestApp::new().await;
    let farmer_id = app.create_farmer().await;
    let harvest_id = app.create_harvest(&farmer_id, "CAFE", "2").await;

    let (status, _) = app
        .send("DELETE", &format!("/harvests/{harvest_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("GET", &format!("/harvests/{harvest_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_harvests_by_farmer() {
    let app = TestApp::new().await;
    let ana = app.create_farmer().await;
    let other = app.create_farmer().await;
    app.create_harvest(&ana, "ARROZ", "1").await;
    app.create_harvest(&ana, "SOYA", "2").await;
    app.create_harvest(&other, "CAFE", "3").await;

    let (_, all) = app.send("GET", "/harvests", None).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (_, mine) = app
        .send("GET", &format!("/harvests?farmer_id={ana}"), None)
        .await;
    assert_eq!(mine.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_id_format() {
    let app = TestApp::new().await;

    let (status, json) = app.send("GET", "/harvests/not-a-uuid", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid harvest ID"));
}

#[tokio::test]
async fn test_farmer_crud() {
    let app = TestApp::new().await;
    let farmer_id = app.create_farmer().await;

    let (status, farmer) = app
        .send(
            "PUT",
            &format!("/farmers/{farmer_id}"),
            Some(json!({
                "name": "Ana Pérez",
                "farm": "El Porvenir",
                "location": "Huila",
                "email": "ana@example.com"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(farmer["farm"], "El Porvenir");

    let (status, _) = app
        .send(
            "POST",
            "/farmers",
            Some(json!({ "name": "", "farm": "x", "location": "y", "email": "bad" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send("DELETE", &format!("/farmers/{farmer_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("GET", &format!("/farmers/{farmer_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inventory_endpoints() {
    let app = TestApp::new().await;
    let item_id = app.create_item("Urea", 8).await;
    app.create_item("Potash", 40).await;

    let (status, _) = app
        .send(
            "POST",
            "/inventory/items",
            Some(json!({ "name": "UREA", "stock": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, item) = app
        .send(
            "POST",
            &format!("/inventory/items/{item_id}/adjust"),
            Some(json!({ "delta": -3 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["stock"], 5);

    let (status, _) = app
        .send(
            "POST",
            &format!("/inventory/items/{item_id}/adjust"),
            Some(json!({ "delta": -6 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/inventory/items/{item_id}/stock"),
            Some(json!({ "stock": -1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, low) = app.send("GET", "/inventory/items/low-stock", None).await;
    assert_eq!(low.as_array().unwrap().len(), 1);
    let (_, low) = app
        .send("GET", "/inventory/items/low-stock?limit=50", None)
        .await;
    assert_eq!(low.as_array().unwrap().len(), 2);

    let (_, supplies) = app
        .send("GET", "/inventory/items?category=supplies", None)
        .await;
    assert_eq!(supplies.as_array().unwrap().len(), 2);

    let (status, stats) = app.send("GET", "/inventory/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_items"], 2);
    assert_eq!(stats["total_stock"], 45);

    let (status, _) = app
        .send("DELETE", &format!("/inventory/items/{item_id}"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_invoice_lifecycle() {
    let app = TestApp::new().await;
    let farmer_id = uuid_string();

    let new_invoice = |harvest_id: String| {
        json!({
            "harvest_id": harvest_id,
            "farmer_id": farmer_id,
            "farmer_name": "Ana",
            "product": "SOYA",
            "quantity": "2",
            "unit_price": "1000"
        })
    };

    let (status, pending) = app
        .send("POST", "/invoices", Some(new_invoice(uuid_string())))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&pending["total"]), Decimal::from(2_380));

    let paid_harvest = uuid_string();
    let (_, paid) = app
        .send("POST", "/invoices", Some(new_invoice(paid_harvest.clone())))
        .await;
    let (status, _) = app
        .send("POST", "/invoices", Some(new_invoice(paid_harvest)))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut oversized = new_invoice(uuid_string());
    oversized["quantity"] = json!("99999999999999");
    oversized["unit_price"] = json!("9999999999999999");
    let (status, json) = app.send("POST", "/invoices", Some(oversized)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("out of range"));

    let (status, updated) = app
        .send(
            "PUT",
            &format!("/invoices/{}/state", paid["id"].as_str().unwrap()),
            Some(json!({ "state": "paid", "notes": "cash" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["state"], "PAID");
    assert!(updated["paid_at"].is_string());

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/invoices/{}", paid["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/invoices/{}", pending["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stats) = app.send("GET", "/invoices/stats", None).await;
    assert_eq!(stats["total_invoices"], 1);
    assert_eq!(stats["paid"], 1);
    assert_eq!(decimal(&stats["total_paid"]), Decimal::from(2_380));

    let (_, by_farmer) = app
        .send("GET", &format!("/invoices?farmer_id={farmer_id}"), None)
        .await;
    assert_eq!(by_farmer.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dead_letters() {
    let app = TestApp::new().await;

    let (status, json) = app
        .send("GET", "/bus/queues/billing.harvest-in-process/dead-letters", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());

    let (status, _) = app
        .send("GET", "/bus/queues/nowhere/dead-letters", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn uuid_string() -> String {
    common::HarvestId::new().to_string()
}
