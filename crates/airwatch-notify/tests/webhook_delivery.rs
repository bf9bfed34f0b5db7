//! Webhook delivery against a local HTTP server: envelope shape, non-2xx
//! retries, and channel isolation inside the throttle manager.
//!
//! Run with:
//! ```bash
//! cargo test -p airwatch-notify --test webhook_delivery
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use airwatch_models::flight::FlightRecord;
use airwatch_notify::{
    ConsoleChannel, NotificationChannel, NotifyError, ThrottleManager, ThrottlePolicy,
    WebhookChannel,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

#[derive(Clone, Default)]
struct Hook {
    bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    hits: Arc<AtomicUsize>,
    fail_first: usize,
}

async fn receive(State(hook): State<Hook>, Json(body): Json<serde_json::Value>) -> StatusCode {
    let hit = hook.hits.fetch_add(1, Ordering::SeqCst);
    if hit < hook.fail_first {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    hook.bodies.lock().unwrap().push(body);
    StatusCode::NO_CONTENT
}

async fn serve(hook: Hook) -> SocketAddr {
    let app = Router::new().route("/hook", post(receive)).with_state(hook);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing is listening on.
async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn flight() -> FlightRecord {
    FlightRecord {
        price: dec!(150),
        carrier: "Porter Airlines".to_string(),
        origin: "Toronto".to_string(),
        destination: "Ottawa".to_string(),
        departure: "08:15".to_string(),
        fetched_at: Utc.with_ymd_and_hms(2025, 7, 5, 15, 0, 0).unwrap(),
        source: "Tavily Search".to_string(),
    }
}

#[tokio::test]
async fn alert_posts_embed_envelope() {
    let hook = Hook::default();
    let addr = serve(hook.clone()).await;
    let channel = WebhookChannel::new(format!("http://{addr}/hook"));
    let manager = ThrottleManager::new(
        ThrottlePolicy::from_cooldown(Duration::from_secs(1800)),
        vec![Arc::new(channel) as Arc<dyn NotificationChannel>],
    );

    assert!(manager.evaluate(&flight(), dec!(200)).await);

    let bodies = hook.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    let embed = &bodies[0]["embeds"][0];
    assert_eq!(embed["title"], "Price drop: Toronto to Ottawa");
    assert_eq!(embed["fields"][0]["value"], "$150");
    assert_eq!(embed["fields"][1]["value"], "Porter Airlines");
    assert!(embed["timestamp"].is_string());
}

#[tokio::test]
async fn server_errors_are_retried() {
    let hook = Hook {
        fail_first: 2,
        ..Hook::default()
    };
    let addr = serve(hook.clone()).await;
    let channel = WebhookChannel::new(format!("http://{addr}/hook"))
        .with_attempts(3)
        .with_backoff(Duration::from_millis(10));

    let manager = ThrottleManager::new(
        ThrottlePolicy::Disabled,
        vec![Arc::new(channel) as Arc<dyn NotificationChannel>],
    );
    assert!(manager.evaluate(&flight(), dec!(200)).await);

    assert_eq!(hook.hits.load(Ordering::SeqCst), 3);
    assert_eq!(hook.bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn exhausted_retries_report_status() {
    let hook = Hook {
        fail_first: usize::MAX,
        ..Hook::default()
    };
    let addr = serve(hook.clone()).await;
    let channel = WebhookChannel::new(format!("http://{addr}/hook"))
        .with_attempts(2)
        .with_backoff(Duration::from_millis(10));

    let alert = airwatch_notify::Alert {
        fingerprint: airwatch_models::NotificationFingerprint::from_flight(&flight()),
        flight: flight(),
        threshold: dec!(200),
        triggered_at: Utc::now(),
    };
    let err = channel.deliver(&alert).await.unwrap_err();
    assert!(matches!(err, NotifyError::Status { status: 500, .. }));
    assert_eq!(hook.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unreachable_webhook_still_counts_as_sent() {
    let addr = closed_addr().await;
    let channel = WebhookChannel::new(format!("http://{addr}/hook"))
        .with_attempts(1)
        .with_timeout(Duration::from_secs(2));
    let manager = ThrottleManager::new(
        ThrottlePolicy::from_cooldown(Duration::from_secs(1800)),
        vec![
            Arc::new(channel) as Arc<dyn NotificationChannel>,
            Arc::new(ConsoleChannel) as Arc<dyn NotificationChannel>,
        ],
    );

    assert!(manager.evaluate(&flight(), dec!(200)).await);
    assert!(!manager.evaluate(&flight(), dec!(200)).await);
}
