//! Read-path tests against the real router with in-memory fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use shared::models::{Delivery, Item, Order, Payment};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use order_server::api;
use order_server::cache::{Cache, CacheReader, CacheWriter};
use order_server::config::Config;
use order_server::db::{OrderStore, StoreError};
use order_server::state::AppState;
use order_server::telemetry::Metrics;

/// Counting cache fake backed by a plain map (no eviction, no TTL).
#[derive(Default)]
struct FakeCache {
    entries: Mutex<HashMap<String, Arc<Order>>>,
    save_calls: AtomicUsize,
}

#[async_trait]
impl CacheReader for FakeCache {
    async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.entries.lock().await.get(order_uid).cloned()
    }
}

#[async_trait]
impl CacheWriter for FakeCache {
    async fn save(&self, order: Arc<Order>) {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .await
            .insert(order.order_uid.clone(), order);
    }
}

impl Cache for FakeCache {
    fn start_janitor(&self, _shutdown: CancellationToken, _interval: Duration) {}
}

/// Counting store fake; `fail` simulates a transient database outage.
#[derive(Default)]
struct FakeStore {
    orders: HashMap<String, Order>,
    reads: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl OrderStore for FakeStore {
    async fn insert_order(&self, _order: &Order) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_order_by_id(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.orders
            .get(order_uid)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.orders.values().cloned().collect())
    }
}

fn test_order(uid: &str) -> Order {
    Order {
        order_uid: uid.to_string(),
        track_number: format!("TRACK-{}", &uid[..8]),
        entry: "WBIL".into(),
        delivery: Delivery {
            name: "Test".into(),
            phone: "+79001234567".into(),
            zip: "123456".into(),
            city: "City".into(),
            address: "Street 1".into(),
            region: "Region".into(),
            email: "test@example.com".into(),
        },
        payment: Payment {
            transaction: uid.to_string(),
            request_id: String::new(),
            currency: "USD".into(),
            provider: "wbpay".into(),
            amount: 100,
            payment_dt: Utc::now().timestamp(),
            bank: "alpha".into(),
            delivery_cost: 10,
            goods_total: 90,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 1,
            track_number: format!("TRACK-{}", &uid[..8]),
            price: 50,
            rid: "rid".into(),
            name: "item".into(),
            sale: 0,
            size: "0".into(),
            total_price: 50,
            nm_id: 1,
            brand: "brand".into(),
            status: 202,
        }],
        locale: "en".into(),
        internal_signature: String::new(),
        customer_id: "customer".into(),
        delivery_service: "meest".into(),
        shard_key: "9".into(),
        sm_id: 1,
        date_created: Utc::now(),
        oof_shard: "1".into(),
    }
}

fn test_app(cache: Arc<FakeCache>, store: Option<Arc<FakeStore>>) -> Router {
    let cfg = Config::from_yaml_str("{}").expect("default config");
    let state = AppState::new(
        cache as Arc<dyn Cache>,
        store.map(|s| s as Arc<dyn OrderStore>),
        Arc::new(Metrics::new().expect("metrics")),
    );
    api::router(state, &cfg)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn healthz_returns_ok() {
    let app = test_app(Arc::new(FakeCache::default()), None);
    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn cache_hit_never_touches_the_store() {
    let uid = Uuid::new_v4().to_string();
    let cache = Arc::new(FakeCache::default());
    cache.save(Arc::new(test_order(&uid))).await;
    let store = Arc::new(FakeStore::default());

    let app = test_app(cache.clone(), Some(store.clone()));
    let (status, body) = get(app, &format!("/order/{uid}")).await;

    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_slice(&body).unwrap();
    assert_eq!(order.order_uid, uid);
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cache_miss_reads_store_and_populates() {
    let uid = Uuid::new_v4().to_string();
    let cache = Arc::new(FakeCache::default());
    let store = Arc::new(FakeStore {
        orders: HashMap::from([(uid.clone(), test_order(&uid))]),
        ..Default::default()
    });

    let app = test_app(cache.clone(), Some(store.clone()));

    let (status, body) = get(app.clone(), &format!("/order/{uid}")).await;
    assert_eq!(status, StatusCode::OK);
    let order: Order = serde_json::from_slice(&body).unwrap();
    assert_eq!(order.order_uid, uid);
    assert_eq!(cache.save_calls.load(Ordering::SeqCst), 1);

    // Second lookup is served from the cache: the store read count stays 1.
    let (status, _) = get(app, &format!("/order/{uid}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_id_is_rejected() {
    let app = test_app(Arc::new(FakeCache::default()), None);
    let (status, body) = get(app, "/order/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, b"Invalid id parameter");
}

#[tokio::test]
async fn missing_id_is_rejected() {
    let app = test_app(Arc::new(FakeCache::default()), None);

    let (status, body) = get(app.clone(), "/order").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, b"Missing id parameter");

    let (status, _) = get(app, "/order/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_id_returns_not_found() {
    let uid = Uuid::new_v4().to_string();
    let app = test_app(
        Arc::new(FakeCache::default()),
        Some(Arc::new(FakeStore::default())),
    );
    let (status, body) = get(app, &format!("/order/{uid}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Order not found");
}

#[tokio::test]
async fn miss_without_store_returns_not_found() {
    let uid = Uuid::new_v4().to_string();
    let app = test_app(Arc::new(FakeCache::default()), None);
    let (status, body) = get(app, &format!("/order/{uid}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Order not found");
}

#[tokio::test]
async fn store_failure_maps_to_internal_error() {
    let uid = Uuid::new_v4().to_string();
    let store = Arc::new(FakeStore {
        fail: true,
        ..Default::default()
    });
    let app = test_app(Arc::new(FakeCache::default()), Some(store));

    let (status, body) = get(app, &format!("/order/{uid}")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, b"Internal server error");
}

#[tokio::test]
async fn metrics_endpoint_serves_exposition_text() {
    let app = test_app(Arc::new(FakeCache::default()), None);
    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    // Registered collectors render even before any increment.
    assert!(String::from_utf8(body).is_ok());
}
