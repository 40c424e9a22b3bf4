//! HTTP fetch capability
//!
//! The crawler depends on [`HttpFetch`] only; [`HttpClient`] is the reqwest
//! implementation. It keeps one pooled client per (proxy route, TLS
//! verification) pair so provider settings never leak into each other.
//!
//! Features:
//! - Connection pooling with keep-alive
//! - Brotli, Gzip compression (auto-negotiated)
//! - Per-request timeout and proxy route
//! - Response decoding in the site charset

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{CrawlError, Result};
use crate::request::{Method, Request};

/// Status, headers and decoded body of one response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Sends one [`Request`]. Returns any status as `Ok`; only transport
/// failures are errors.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: Option<String>,
    insecure_tls: bool,
}

/// reqwest-backed [`HttpFetch`].
pub struct HttpClient {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let key = ClientKey {
            proxy: None,
            insecure_tls: false,
        };
        let client = build_client(&key)?;
        Ok(Self {
            clients: Mutex::new(HashMap::from([(key, client)])),
        })
    }

    fn client_for(&self, request: &Request) -> Result<Client> {
        let key = ClientKey {
            proxy: request.proxy.clone(),
            insecure_tls: request.insecure_tls,
        };
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let client = build_client(&key)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

fn build_client(key: &ClientKey) -> Result<Client> {
    let mut builder = Client::builder()
        // ═══════════════════════════════════════════════════════════════
        // CONNECTION REUSE
        // ═══════════════════════════════════════════════════════════════
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        // ═══════════════════════════════════════════════════════════════
        // TLS
        // ═══════════════════════════════════════════════════════════════
        .use_rustls_tls()
        .danger_accept_invalid_certs(key.insecure_tls)
        // ═══════════════════════════════════════════════════════════════
        // COMPRESSION (auto-negotiated via Accept-Encoding)
        // ═══════════════════════════════════════════════════════════════
        .brotli(true)
        .gzip(true)
        .deflate(true)
        // ═══════════════════════════════════════════════════════════════
        // TIMEOUTS (the total timeout is set per request)
        // ═══════════════════════════════════════════════════════════════
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .cookie_store(true);

    if let Some(proxy) = &key.proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| CrawlError::Config(format!("invalid proxy {proxy}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| CrawlError::Config(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl HttpFetch for HttpClient {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let client = self.client_for(request)?;

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Post => client.post(&request.url),
        }
        .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(method = ?request.method, proxied = request.proxy.is_some(), "Sending request");
        let response = builder
            .send()
            .await
            .map_err(|e| CrawlError::network(&request.url, e))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .and_modify(|v: &mut String| {
                        v.push_str(", ");
                        v.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }
        }

        // A configured site charset overrides whatever the server declares.
        let body = match request.charset {
            Some(charset) => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| CrawlError::network(&request.url, e))?;
                charset.decode(&bytes).0.into_owned()
            }
            None => response
                .text_with_charset("utf-8")
                .await
                .map_err(|e| CrawlError::network(&request.url, e))?,
        };

        debug!(status, bytes = body.len(), "Response received");

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
