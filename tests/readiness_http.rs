//! Integration tests for HTTP readiness probing against a live listener.

#![expect(clippy::expect_used, reason = "expect is standard practice in tests")]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use metaship::error::ReadinessError;
use metaship::readiness::{HttpProbe, ReadinessPolicy, wait_until_ready};
use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

/// Serve `router` on an ephemeral loopback port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server should run");
    });
    format!("http://{address}")
}

/// A health endpoint failing `failures` times before answering 200.
fn warming_up(failures: u32, hits: Arc<AtomicU32>) -> Router {
    Router::new().route(
        "/api/health",
        get(move || {
            let hits = Arc::clone(&hits);
            async move {
                let seen = hits.fetch_add(1, Ordering::SeqCst);
                if seen < failures {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }
        }),
    )
}

#[fixture]
fn policy() -> ReadinessPolicy {
    ReadinessPolicy {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(40),
        timeout: Duration::from_secs(5),
    }
}

#[rstest]
#[tokio::test]
async fn service_is_ready_after_warming_up(policy: ReadinessPolicy) {
    let hits = Arc::new(AtomicU32::new(0));
    let base = serve(warming_up(2, Arc::clone(&hits))).await;
    let probe = HttpProbe::new(reqwest::Client::new(), format!("{base}/api/health"));

    let report = wait_until_ready(&probe, &policy, &CancellationToken::new())
        .await
        .expect("service should become ready");

    assert_eq!(report.attempts, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[rstest]
#[tokio::test]
async fn missing_endpoint_times_out(mut policy: ReadinessPolicy) {
    policy.timeout = Duration::from_millis(200);
    let base = serve(Router::new()).await;
    let probe = HttpProbe::new(reqwest::Client::new(), format!("{base}/api/health"));

    let error = wait_until_ready(&probe, &policy, &CancellationToken::new())
        .await
        .expect_err("a 404 should never count as ready");

    assert!(matches!(error, ReadinessError::Timeout { .. }), "{error:?}");
}
