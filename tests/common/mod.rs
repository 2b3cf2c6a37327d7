//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use keygate_proxy::keys::FileKeyStore;
use keygate_proxy::{HttpServer, ProxyConfig, Shutdown};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A running proxy bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub store: Arc<FileKeyStore>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the proxy with defaults adjusted by `configure`.
#[allow(dead_code)]
pub async fn start_proxy<F>(configure: F) -> TestProxy
where
    F: FnOnce(&mut ProxyConfig),
{
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    configure(&mut config);

    let store = Arc::new(match &config.keys.store_path {
        Some(path) => FileKeyStore::open(path.as_str()).unwrap(),
        None => FileKeyStore::in_memory(),
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, store.clone()).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy { addr, store, shutdown }
}

/// Client that never routes through a system proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Read a request head so the peer never sees a reset.
async fn drain_request_head(socket: &mut TcpStream) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Start a raw backend that writes `head` (status line plus headers) and `body`.
#[allow(dead_code)]
pub async fn start_mock_backend(head: &'static str, body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (head.to_string(), body.to_string()) }).await
}

/// Start a programmable raw backend with async support.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (String, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                drain_request_head(&mut socket).await;
                let (head, body) = f().await;
                let response = format!(
                    "{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    head,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

/// Start an upstream that answers every request with a JSON description of it.
#[allow(dead_code)]
pub async fn start_echo_upstream() -> SocketAddr {
    async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> ([(&'static str, &'static str); 1], Json<Value>) {
        let headers: Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or_default().to_string())))
            .collect();
        (
            [("x-upstream", "echo")],
            Json(json!({
                "method": method.as_str(),
                "headers": headers,
                "body": String::from_utf8_lossy(&body),
            })),
        )
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, Router::new().fallback(echo)).await;
    });
    addr
}

/// Start an upstream where `/start` redirects to `/final` and `/loop`
/// redirects to itself.
#[allow(dead_code)]
pub async fn start_redirect_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/start", get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/final")]) }))
        .route("/final", get(|| async { "arrived" }))
        .route("/loop", get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/loop")]) }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// An address on which nothing is listening.
#[allow(dead_code)]
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
