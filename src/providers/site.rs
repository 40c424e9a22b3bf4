//! What a site binding is made of, and the context its transforms run in.

use std::sync::Arc;

use tracing::debug;

use crate::bypass::BypassLayer;
use crate::config::{BypassMode, ProviderConfig};
use crate::error::{CrawlError, Result};
use crate::http_client::{HttpFetch, Response};
use crate::request::{Request, RequestBuilder, SearchShape};
use crate::selector::{InfoSpec, SearchSpec};
use crate::types::SearchResult;

/// Explicit context handed to every field transform of one provider.
pub struct SiteContext {
    pub name: String,
    pub requests: RequestBuilder,
    fetcher: Arc<dyn HttpFetch>,
    bypass: Option<Arc<BypassLayer>>,
}

impl SiteContext {
    pub fn new(
        name: impl Into<String>,
        config: Arc<ProviderConfig>,
        fetcher: Arc<dyn HttpFetch>,
        bypass: Option<Arc<BypassLayer>>,
    ) -> Self {
        Self {
            name: name.into(),
            requests: RequestBuilder::new(config),
            fetcher,
            bypass,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        self.requests.config()
    }

    /// Send `request`, through the bypass layer when the provider is in
    /// challenge-solver mode. Non-success statuses are errors.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let response = match (&self.bypass, self.config().bypass_mode) {
            (Some(layer), BypassMode::ChallengeSolver) => {
                layer.execute(&self.name, self.fetcher.as_ref(), request).await?
            }
            _ => self.fetcher.fetch(request).await?,
        };

        if !response.is_success() {
            return Err(CrawlError::Status {
                url: request.url.clone(),
                status: response.status,
            });
        }
        debug!(provider = %self.name, bytes = response.body.len(), "Fetched");
        Ok(response)
    }

    /// Body of a GET for `url` with the provider's headers.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.send(&self.requests.page(url)).await?.body)
    }

    /// GET a third-party embed page. Never goes through the bypass layer:
    /// the provider's solved token belongs to the provider's host only.
    pub async fn get_embed(&self, url: &str) -> Result<String> {
        let request = self.requests.page(url);
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(CrawlError::Status {
                url: request.url,
                status: response.status,
            });
        }
        Ok(response.body)
    }

    pub fn absolute_url(&self, href: &str) -> String {
        absolute_url(&self.config().base_url, href)
    }
}

/// Resolve `href` against `base`. Protocol-relative links get `https:`.
pub fn absolute_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    match url::Url::parse(base).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Last non-empty path segment of a link, without query or fragment.
pub fn last_path_part(href: &str) -> String {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Info page URL for `id`: full URLs are used as-is, anything else is a
/// path under the base URL.
pub fn default_info_url(config: &ProviderConfig, id: &str) -> String {
    if id.starts_with("http") {
        return id.to_string();
    }
    let path = urlencoding::decode(id).map_or_else(|_| id.to_string(), |p| p.into_owned());
    format!("{}/{}", config.base_url, path.trim_start_matches('/'))
}

/// Identity post-process hook.
pub fn keep_all(results: Vec<SearchResult>) -> Vec<SearchResult> {
    results
}

/// Everything that distinguishes one site from another. Pure data plus
/// plain function pointers; no per-site types.
pub struct SiteDefinition {
    pub name: &'static str,
    pub search_shape: SearchShape,
    pub search: SearchSpec<SiteContext>,
    pub info: InfoSpec<SiteContext>,
    pub info_url: fn(&ProviderConfig, &str) -> String,
    pub post_process: fn(Vec<SearchResult>) -> Vec<SearchResult>,
    /// Extractor used for this site's unresolved files.
    pub default_extractor: &'static str,
}

impl SiteDefinition {
    pub fn validate(&self) -> Result<()> {
        if self.search.is_valid() && self.info.is_valid() {
            Ok(())
        } else {
            Err(CrawlError::Config(format!(
                "provider {} has an invalid selector",
                self.name
            )))
        }
    }
}
