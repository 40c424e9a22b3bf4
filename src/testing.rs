//! In-memory [`HttpFetch`] for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CrawlError, Result};
use crate::http_client::{HttpFetch, Response};
use crate::request::Request;

struct Route {
    needle: String,
    cookie: Option<String>,
    reply: Option<(u16, String)>,
}

/// Answers by the first route whose needle occurs in the URL (and whose
/// cookie, if any, the request carries). Unmatched URLs are network errors.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Vec<Route>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, needle: &str, status: u16, body: &str) -> Self {
        self.routes.push(Route {
            needle: needle.to_string(),
            cookie: None,
            reply: Some((status, body.to_string())),
        });
        self
    }

    pub fn route_with_cookie(mut self, needle: &str, cookie: &str, status: u16, body: &str) -> Self {
        self.routes.push(Route {
            needle: needle.to_string(),
            cookie: Some(cookie.to_string()),
            reply: Some((status, body.to_string())),
        });
        self
    }

    /// Connection failure for matching URLs.
    pub fn fail(mut self, needle: &str) -> Self {
        self.routes.push(Route {
            needle: needle.to_string(),
            cookie: None,
            reply: None,
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(needle))
            .count()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        // Suspend once so concurrent callers interleave like real I/O.
        tokio::task::yield_now().await;

        let cookie = request.header("cookie").unwrap_or_default();
        let route = self.routes.iter().find(|r| {
            request.url.contains(&r.needle)
                && r.cookie.as_deref().map_or(true, |c| cookie.contains(c))
        });

        match route.and_then(|r| r.reply.as_ref()) {
            Some((status, body)) => Ok(Response::new(*status, body.clone())),
            None => Err(CrawlError::network(&request.url, "connection refused")),
        }
    }
}
