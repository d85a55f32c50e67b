#![allow(dead_code)]

use axum::Router;
use axum::http::HeaderMap;
use powerbi_admin_mcp::powerbi::{
    ClientSettings, PollSettings, PowerBiClient, RetryPolicy, StaticToken,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const TEST_TOKEN: &str = "test-token";

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{}", addr)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    }
}

/// Client pointed at the mock: admin API under `/admin`, Fabric API under `/fabric`.
pub fn client(base_url: &str) -> PowerBiClient {
    PowerBiClient::with_settings(
        Arc::new(StaticToken::new(TEST_TOKEN)),
        ClientSettings {
            admin_base_url: format!("{}/admin", base_url),
            fabric_base_url: format!("{}/fabric", base_url),
            retry: fast_retry(),
        },
    )
}

pub fn fast_poll() -> PollSettings {
    PollSettings::new(Duration::from_secs(5), Duration::from_millis(10))
}

pub fn is_authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TEST_TOKEN))
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    /// Increment and return the new count (1-based).
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
