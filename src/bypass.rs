//! Bot-challenge bypass
//!
//! Per request the layer moves through:
//!
//! ```text
//! Direct ──(challenge page?)──▶ Challenged ──▶ BypassRequested
//!                                              ├─ solved ─▶ retry once with token
//!                                              └─ failed ─▶ ChallengeUnresolved
//! ```
//!
//! Solved tokens are cached per provider and attached to later requests
//! until the site rejects them or they expire. A challenge on the retry is a
//! hard failure: there is never more than one bypass round per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{CrawlError, Result};
use crate::http_client::{HttpFetch, Response};
use crate::request::{Method, Request};

/// Body fragments that only appear on challenge interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "challenge-platform",
    "cf-browser-verification",
    "cf_chl_opt",
    "jschl-answer",
    "<title>Just a moment...</title>",
    "DDoS-Guard",
];

/// `true` when the response is a bot-challenge page instead of content.
///
/// Shape only: blocking status plus a challenge marker or a known
/// protection server. Nothing provider-specific.
pub fn is_challenge(response: &Response) -> bool {
    if !matches!(response.status, 403 | 429 | 503) {
        return false;
    }
    let server = response.header("server").unwrap_or_default().to_ascii_lowercase();
    server.contains("cloudflare")
        || server.contains("ddos-guard")
        || CHALLENGE_MARKERS.iter().any(|m| response.body.contains(m))
}

/// Proof of a solved challenge, sent back as cookies.
#[derive(Debug, Clone)]
pub struct BypassToken {
    pub cookie: String,
    /// The solver's browser identity; clearance cookies are bound to it.
    pub user_agent: Option<String>,
    acquired: Instant,
    ttl: Duration,
}

impl BypassToken {
    pub fn new(cookie: impl Into<String>, user_agent: Option<String>, ttl: Duration) -> Self {
        Self {
            cookie: cookie.into(),
            user_agent,
            acquired: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.acquired.elapsed() >= self.ttl
    }

    /// Copy of `request` carrying this token.
    pub fn attach(&self, request: &Request) -> Request {
        let mut request = request.clone();
        let cookie = match request.header("cookie") {
            Some(existing) if !existing.is_empty() => format!("{existing}; {}", self.cookie),
            _ => self.cookie.clone(),
        };
        request.set_header("Cookie", cookie);
        if let Some(ua) = &self.user_agent {
            request.set_header("User-Agent", ua.clone());
        }
        request
    }
}

/// Side channel that solves a challenge for a URL.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn solve(&self, request: &Request) -> anyhow::Result<BypassToken>;
}

/// Client for a FlareSolverr-compatible solver endpoint.
pub struct SolverClient {
    fetcher: Arc<dyn HttpFetch>,
    endpoint: String,
    max_timeout: Duration,
    token_ttl: Duration,
}

impl SolverClient {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        endpoint: impl Into<String>,
        max_timeout: Duration,
        token_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            max_timeout,
            token_ttl,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverSolution {
    #[serde(default)]
    cookies: Vec<SolverCookie>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolverCookie {
    name: String,
    value: String,
}

#[async_trait]
impl ChallengeSolver for SolverClient {
    async fn solve(&self, request: &Request) -> anyhow::Result<BypassToken> {
        let max_timeout = u64::try_from(self.max_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut command = serde_json::json!({
            "cmd": "request.get",
            "url": request.url,
            "maxTimeout": max_timeout,
        });
        if request.method == Method::Post {
            command["cmd"] = "request.post".into();
            command["postData"] = request.body.clone().unwrap_or_default().into();
        }

        let solver_request = Request::post_json(&self.endpoint, &command)
            .with_timeout(self.max_timeout + Duration::from_secs(5));
        let response = self
            .fetcher
            .fetch(&solver_request)
            .await
            .context("challenge solver unreachable")?;
        if !response.is_success() {
            bail!("challenge solver answered {}", response.status);
        }

        let parsed: SolverResponse =
            serde_json::from_str(&response.body).context("invalid solver response")?;
        if parsed.status != "ok" {
            bail!("solver status {}: {}", parsed.status, parsed.message);
        }
        let solution = parsed.solution.context("solver returned no solution")?;

        let cookie = solution
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        if cookie.is_empty() {
            bail!("solver returned no cookies");
        }

        Ok(BypassToken::new(cookie, solution.user_agent, self.token_ttl))
    }
}

type TokenSlot = Arc<Mutex<Option<BypassToken>>>;

/// Retry-through-solver wrapper shared by every challenge-protected provider.
pub struct BypassLayer {
    solver: Arc<dyn ChallengeSolver>,
    tokens: RwLock<HashMap<String, TokenSlot>>,
}

impl BypassLayer {
    pub fn new(solver: Arc<dyn ChallengeSolver>) -> Self {
        Self {
            solver,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, provider: &str) -> TokenSlot {
        if let Some(slot) = self.tokens.read().await.get(provider) {
            return Arc::clone(slot);
        }
        let mut tokens = self.tokens.write().await;
        Arc::clone(tokens.entry(provider.to_string()).or_default())
    }

    /// Current unexpired token for `provider`.
    pub async fn cached_token(&self, provider: &str) -> Option<BypassToken> {
        let slot = self.slot(provider).await;
        let token = slot.lock().await.clone();
        token.filter(|t| !t.is_expired())
    }

    /// Send `request`, solving at most one challenge on the way.
    #[instrument(skip(self, fetcher, request), fields(url = %request.url))]
    pub async fn execute(
        &self,
        provider: &str,
        fetcher: &dyn HttpFetch,
        request: &Request,
    ) -> Result<Response> {
        let slot = self.slot(provider).await;
        let cached = slot.lock().await.clone().filter(|t| !t.is_expired());

        let attempt = match &cached {
            Some(token) => token.attach(request),
            None => request.clone(),
        };

        match fetcher.fetch(&attempt).await {
            Ok(response) if !is_challenge(&response) => return Ok(response),
            Ok(response) => {
                debug!(status = response.status, had_token = cached.is_some(), "Challenge detected");
            }
            Err(err) if err.is_network() => {
                warn!("{err}; retrying through challenge solver");
            }
            Err(err) => return Err(err),
        }

        let token = self.refresh(provider, &slot, cached.as_ref(), request).await?;
        let response = fetcher.fetch(&token.attach(request)).await?;

        if is_challenge(&response) {
            Self::invalidate(&slot, &token).await;
            return Err(CrawlError::ChallengeUnresolved {
                provider: provider.to_string(),
                reason: format!("challenged again (status {}) after token retry", response.status),
            });
        }
        Ok(response)
    }

    /// Drop `rejected` from the cache unless a newer token already
    /// replaced it.
    async fn invalidate(slot: &TokenSlot, rejected: &BypassToken) {
        let mut guard = slot.lock().await;
        if guard.as_ref().is_some_and(|current| current.cookie == rejected.cookie) {
            *guard = None;
        }
    }

    /// Replace the rejected token under the provider's exclusive section.
    ///
    /// If another call already stored a newer token while we waited, that
    /// one is used instead of solving again.
    async fn refresh(
        &self,
        provider: &str,
        slot: &TokenSlot,
        rejected: Option<&BypassToken>,
        request: &Request,
    ) -> Result<BypassToken> {
        let mut guard = slot.lock().await;

        if let Some(current) = guard.as_ref() {
            let newer = rejected.map_or(true, |r| r.cookie != current.cookie);
            if newer && !current.is_expired() {
                debug!("Using token refreshed by a concurrent request");
                return Ok(current.clone());
            }
        }
        *guard = None;

        match self.solver.solve(request).await {
            Ok(token) => {
                info!(provider, "Challenge solved");
                *guard = Some(token.clone());
                Ok(token)
            }
            Err(err) => Err(CrawlError::ChallengeUnresolved {
                provider: provider.to_string(),
                reason: format!("{err:#}"),
            }),
        }
    }
}
