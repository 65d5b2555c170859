//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use dns_rewrites::config::AdminConfig;
use dns_rewrites::filtering::{DnsFilter, NoopPersister};
use dns_rewrites::{HttpServer, RewriteEntry};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A running admin server; stops when dropped.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub filter: Arc<DnsFilter>,
    _shutdown: oneshot::Sender<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// API key of every test server.
pub const TEST_API_KEY: &str = "test-admin-key";

/// Start the admin API on an ephemeral port.
#[allow(dead_code)]
pub async fn start_server(rewrites: &[RewriteEntry]) -> TestServer {
    let filter = Arc::new(DnsFilter::new(rewrites, Arc::new(NoopPersister)).unwrap());

    let admin = AdminConfig {
        enabled: true,
        api_key: TEST_API_KEY.to_string(),
        ..AdminConfig::default()
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = HttpServer::new(filter.clone(), admin);
    tokio::spawn(async move {
        let _ = server
            .run(listener, async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        addr,
        filter,
        _shutdown: tx,
    }
}

/// Build a reqwest client that bypasses any system proxy and authenticates
/// with `TEST_API_KEY`.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    let mut headers = HeaderMap::new();
    let bearer = format!("Bearer {}", TEST_API_KEY);
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer).unwrap());

    reqwest::Client::builder()
        .no_proxy()
        .default_headers(headers)
        .build()
        .unwrap()
}

/// Build a client that sends no credentials.
#[allow(dead_code)]
pub fn anonymous_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
