//! End-to-end scenarios: webhook → queue → worker → Postgres, and the
//! polled path through /trigger-poll.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use common::{wait_for, TestHarness};
use serde_json::{json, Value};
use sync_core::common::signature;
use sync_core::domains::inventory::models::{AuditRow, CanonicalRecord, InventoryRow, Source};
use sync_core::kernel::jobs::{
    JobQueue, RedisJobQueue, SyncJob, SyncWorker, WorkerConfig,
};
use sync_core::kernel::{
    LockConfig, LockManager, MarketplaceBClient, MarketplaceBPoller, PollerConfig,
    RedisCursorStore,
};
use sync_core::server::{build_app, AppState};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WEBHOOK_SECRET: &str = "secret";

struct TestApp {
    app: Router,
    queue: Arc<dyn JobQueue>,
    harness: TestHarness,
    shutdown: CancellationToken,
}

impl TestApp {
    /// Full stack against the shared containers: isolated queue, worker
    /// running in the background, poller pointed at `marketplace_b_url`.
    async fn spawn(marketplace_b_url: &str) -> Self {
        let harness = TestHarness::new().await;

        let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::with_prefix(
            harness.redis.clone(),
            TestHarness::unique("queue:pipeline"),
        ));
        let locks = Arc::new(LockManager::new(
            harness.redis.clone(),
            LockConfig::default(),
        ));

        let poller = Arc::new(MarketplaceBPoller::new(
            MarketplaceBClient::new(marketplace_b_url, "test-key").unwrap(),
            queue.clone(),
            Arc::new(RedisCursorStore::new(harness.redis.clone())),
            PollerConfig::default(),
        ));

        let state = AppState {
            db_pool: harness.pool.clone(),
            queue: queue.clone(),
            poller,
            kv_probe: harness.redis.clone(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
        };
        let app = build_app(state);

        let worker = Arc::new(SyncWorker::with_config(
            queue.clone(),
            locks,
            harness.pool.clone(),
            WorkerConfig {
                poll_interval: Duration::from_millis(50),
                ..WorkerConfig::default()
            },
        ));
        let shutdown = CancellationToken::new();
        let worker_shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(worker_shutdown).await });

        Self {
            app,
            queue,
            harness,
            shutdown,
        }
    }

    async fn post_webhook(&self, body: &str, sig: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhooks/marketplace-a")
            .header("content-type", "application/json");
        if let Some(sig) = sig {
            request = request.header("x-marketplace-signature", sig);
        }
        let response = self
            .app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn valid_webhook_flows_through_to_inventory_and_audit() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;
    let product_id = TestHarness::unique("PROD-ABC");

    let body = format!(
        r#"{{"product_code":"{product_id}","available_stock":50,"timestamp":"2026-01-01T10:00:00Z","warehouse":"WH-NY-01"}}"#
    );
    let sig = signature::sign(WEBHOOK_SECRET, body.as_bytes());

    let (status, response) = app.post_webhook(&body, Some(&sig)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["productId"], product_id.as_str());
    assert!(response["data"]["jobId"]
        .as_str()
        .unwrap()
        .starts_with("marketplace_a-"));

    let pool = app.harness.pool.clone();
    let pid = product_id.clone();
    wait_for("webhook row to land", Duration::from_secs(10), || {
        let pool = pool.clone();
        let pid = pid.clone();
        async move {
            !InventoryRow::find_by_product(&pid, &pool)
                .await
                .unwrap()
                .is_empty()
        }
    })
    .await;

    let (status, response) = app.get_json(&format!("/inventory/{product_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = response["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity"], 50);
    assert_eq!(rows[0]["source"], "marketplace_a");
    assert_eq!(rows[0]["warehouse_id"], "WH-NY-01");
    let updated_at =
        DateTime::parse_from_rfc3339(rows[0]["updated_at"].as_str().unwrap()).unwrap();
    assert_eq!(updated_at.timestamp(), 1_767_261_600); // 2026-01-01T10:00:00Z

    let (status, response) = app
        .get_json(&format!("/inventory/{product_id}/audit"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let audit = response["data"].as_array().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["old_quantity"], Value::Null);
    assert_eq!(audit[0]["new_quantity"], 50);
}

#[tokio::test]
async fn bad_signature_is_rejected_without_side_effects() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;
    let product_id = TestHarness::unique("PROD");

    let body = format!(r#"{{"product_code":"{product_id}","available_stock":5,"timestamp":"2026-01-01T10:00:00Z"}}"#);
    let (status, response) = app
        .post_webhook(&body, Some("deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["success"], false);

    // Nothing enqueued, nothing persisted.
    let stats = app.queue.stats().await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(InventoryRow::find_by_product(&product_id, &app.harness.pool)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;
    let (status, _) = app
        .post_webhook(r#"{"product_code":"P","available_stock":1,"timestamp":"2026-01-01T10:00:00Z"}"#, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_is_a_400() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;

    let body = r#"{"available_stock":50,"timestamp":"2026-01-01T10:00:00Z"}"#;
    let sig = signature::sign(WEBHOOK_SECRET, body.as_bytes());
    let (status, response) = app.post_webhook(body, Some(&sig)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);
    assert_eq!(app.queue.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn signature_must_cover_the_exact_bytes_received() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;

    let signed = r#"{"product_code":"P-1","available_stock":5,"timestamp":"2026-01-01T10:00:00Z"}"#;
    let delivered = r#"{ "product_code": "P-1", "available_stock": 5, "timestamp": "2026-01-01T10:00:00Z" }"#;
    let sig = signature::sign(WEBHOOK_SECRET, signed.as_bytes());

    // Semantically identical JSON with different whitespace must fail.
    let (status, _) = app.post_webhook(delivered, Some(&sig)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn concurrent_updates_for_one_product_agree_with_the_audit_trail() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;
    let product_id = TestHarness::unique("PROD-X");

    for quantity in [10, 20] {
        let body = format!(
            r#"{{"product_code":"{product_id}","available_stock":{quantity},"timestamp":"2026-01-01T10:00:00Z"}}"#
        );
        let sig = signature::sign(WEBHOOK_SECRET, body.as_bytes());
        let (status, _) = app.post_webhook(&body, Some(&sig)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let pool = app.harness.pool.clone();
    let pid = product_id.clone();
    wait_for("both updates to commit", Duration::from_secs(10), || {
        let pool = pool.clone();
        let pid = pid.clone();
        async move {
            AuditRow::find_by_product(&pid, 50, &pool)
                .await
                .unwrap()
                .len()
                == 2
        }
    })
    .await;

    let rows = InventoryRow::find_by_product(&product_id, &app.harness.pool)
        .await
        .unwrap();
    let audit = AuditRow::find_by_product(&product_id, 50, &app.harness.pool)
        .await
        .unwrap();

    // Either lock-acquisition order is legal; the row and the audit trail
    // must agree with each other.
    assert_eq!(rows.len(), 1);
    assert_eq!(audit.len(), 2);
    assert_eq!(rows[0].quantity, audit[0].new_quantity);
    assert_eq!(audit[0].old_quantity, Some(audit[1].new_quantity));
    assert_eq!(audit[1].old_quantity, None);

    let mut quantities = vec![audit[0].new_quantity, audit[1].new_quantity];
    quantities.sort();
    assert_eq!(quantities, vec![10, 20]);
}

#[tokio::test]
async fn invalid_job_payload_dead_letters_without_retry() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;

    // A payload that passes no validation: empty product id. It can only
    // enter through the queue directly (adapters reject it upstream).
    let record = CanonicalRecord {
        product_id: String::new(),
        quantity: 1,
        source: Source::MarketplaceA,
        warehouse_id: None,
        updated_at: Utc::now(),
        metadata: None,
    };
    app.queue.add(SyncJob::new(record)).await.unwrap();

    let queue = app.queue.clone();
    wait_for("job to dead-letter", Duration::from_secs(10), || {
        let queue = queue.clone();
        async move { queue.stats().await.unwrap().failed == 1 }
    })
    .await;

    let stats = app.queue.stats().await.unwrap();
    assert_eq!(stats.delayed, 0);
    assert_eq!(stats.completed, 0);
}

#[tokio::test]
async fn triggered_poll_ingests_marketplace_b_items_and_advances_cursor() {
    let server = MockServer::start().await;
    let sku = TestHarness::unique("SKU");
    Mock::given(method("GET"))
        .and(path("/inventory/updates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"sku": sku, "qty": 7, "location_id": "L", "last_modified": 1735689600}
            ]
        })))
        .mount(&server)
        .await;

    let app = TestApp::spawn(&server.uri()).await;

    let before = Utc::now().timestamp();
    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/trigger-poll")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["outcome"], "completed");
    assert_eq!(body["data"]["enqueued"], 1);
    assert!(body["data"]["cursor"].as_i64().unwrap() >= before);

    let pool = app.harness.pool.clone();
    let pid = sku.clone();
    wait_for("polled row to land", Duration::from_secs(10), || {
        let pool = pool.clone();
        let pid = pid.clone();
        async move {
            !InventoryRow::find_by_product(&pid, &pool)
                .await
                .unwrap()
                .is_empty()
        }
    })
    .await;

    let rows = InventoryRow::find_by_product(&sku, &app.harness.pool)
        .await
        .unwrap();
    assert_eq!(rows[0].quantity, 7);
    assert_eq!(rows[0].source, Source::MarketplaceB);
    assert_eq!(rows[0].warehouse_id.as_deref(), Some("L"));
    assert_eq!(rows[0].updated_at.timestamp(), 1_735_689_600);
}

#[tokio::test]
async fn health_reports_dependencies_and_queue_stats() {
    let app = TestApp::spawn("http://127.0.0.1:9").await;

    let (status, response) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert_eq!(response["database"]["status"], "ok");
    assert_eq!(response["key_value_store"]["status"], "ok");
    assert!(response["queue"]["total"].is_u64());
}
