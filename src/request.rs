//! Outbound request construction.
//!
//! A [`Request`] is a plain value: building one never touches the network,
//! and the bypass layer re-sends the same value when it retries. Query
//! charset conversion happens here and nowhere else.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use encoding_rs::Encoding;

use crate::config::{BypassMode, ProviderConfig};
use crate::fingerprint::{random_profile, BrowserProfile};

/// HTTP method of a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Fully described outbound request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Already-encoded body (form or JSON).
    pub body: Option<String>,
    pub timeout: Duration,
    /// Proxy route, set only for providers in proxy mode.
    pub proxy: Option<String>,
    /// Charset the response body is decoded with.
    pub charset: Option<&'static Encoding>,
    pub insecure_tls: bool,
}

impl Request {
    /// Bare GET with a default timeout; used by collaborators that are not
    /// tied to one provider (solver, embed resolvers).
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(10),
            proxy: None,
            charset: None,
            insecure_tls: false,
        }
    }

    /// POST with a JSON body.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        let mut request = Self::get(url);
        request.method = Method::Post;
        request
            .headers
            .insert("Content-Type".into(), "application/json".into());
        request.body = Some(body.to_string());
        request
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing one regardless of case.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value);
    }
}

/// How a provider's search endpoint expects the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchShape {
    /// `GET <search_url>?<param>=<query>`
    QueryParam(&'static str),
    /// DataLife Engine search form, `POST <search_url>` with `story=<query>`.
    DataLifeForm,
}

/// Builds every request one provider sends.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: Arc<ProviderConfig>,
    profile: BrowserProfile,
}

impl RequestBuilder {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self {
            config,
            profile: random_profile(),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn base(&self, method: Method, url: String) -> Request {
        let mut headers = self.config.headers.clone();
        self.profile.fill_missing(&mut headers);

        let proxy = match self.config.bypass_mode {
            BypassMode::Proxy => self.config.proxy_url.clone(),
            BypassMode::None | BypassMode::ChallengeSolver => None,
        };

        Request {
            method,
            url,
            headers,
            body: None,
            timeout: self.config.timeout(),
            proxy,
            charset: self.config.charset(),
            insecure_tls: self.config.insecure_tls,
        }
    }

    /// GET of any page on the provider's site, with the provider's headers.
    pub fn page(&self, url: &str) -> Request {
        self.base(Method::Get, url.to_string())
    }

    /// The search request for `query`.
    pub fn search(&self, shape: SearchShape, query: &str) -> Request {
        let encoded = self.encode_query(query);
        match shape {
            SearchShape::QueryParam(param) => {
                let sep = if self.config.search_url.contains('?') {
                    '&'
                } else {
                    '?'
                };
                let url = format!("{}{sep}{param}={encoded}", self.config.search_url);
                self.base(Method::Get, url)
            }
            SearchShape::DataLifeForm => {
                let mut request = self.base(Method::Post, self.config.search_url.clone());
                request.set_header(
                    "Content-Type",
                    "application/x-www-form-urlencoded".to_string(),
                );
                request.body = Some(format!(
                    "do=search&subaction=search&search_start=0&full_search=0&result_from=1&story={encoded}"
                ));
                request
            }
        }
    }

    /// Percent-encode `query` in the site's charset.
    pub fn encode_query(&self, query: &str) -> String {
        match self.config.charset() {
            Some(charset) if charset != encoding_rs::UTF_8 => {
                let (bytes, _, unmappable) = charset.encode(query);
                if unmappable {
                    tracing::debug!("query has characters outside {}", charset.name());
                }
                urlencoding::encode_binary(&bytes).into_owned()
            }
            _ => urlencoding::encode(query).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(f: impl FnOnce(&mut ProviderConfig)) -> RequestBuilder {
        let mut cfg = ProviderConfig::new("https://site.test");
        cfg.search_url = "https://site.test/search".into();
        f(&mut cfg);
        RequestBuilder::new(Arc::new(cfg))
    }

    #[test]
    fn query_param_search_is_get() {
        let req = builder(|_| {}).search(SearchShape::QueryParam("s"), "star wars");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "https://site.test/search?s=star%20wars");
        assert!(req.body.is_none());
        assert!(req.proxy.is_none());
    }

    #[test]
    fn query_param_appends_to_existing_query() {
        let req = builder(|c| c.search_url = "https://site.test/index.php?do=search".into())
            .search(SearchShape::QueryParam("q"), "x");
        assert_eq!(req.url, "https://site.test/index.php?do=search&q=x");
    }

    #[test]
    fn datalife_form_carries_story() {
        let req = builder(|_| {}).search(SearchShape::DataLifeForm, "матрица");
        assert_eq!(req.method, Method::Post);
        assert_eq!(
            req.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        let body = req.body.unwrap();
        assert!(body.starts_with("do=search&subaction=search"));
        assert!(body.ends_with(&format!("story={}", urlencoding::encode("матрица"))));
    }

    #[test]
    fn query_is_reencoded_in_site_charset() {
        let b = builder(|c| c.encoding = Some("windows-1251".into()));
        assert_eq!(b.encode_query("привет"), "%EF%F0%E8%E2%E5%F2");
        let req = b.search(SearchShape::DataLifeForm, "привет");
        assert!(req.body.unwrap().ends_with("story=%EF%F0%E8%E2%E5%F2"));
        assert_eq!(req.charset, Some(encoding_rs::WINDOWS_1251));
    }

    #[test]
    fn proxy_route_only_in_proxy_mode() {
        let proxied = builder(|c| {
            c.bypass_mode = BypassMode::Proxy;
            c.proxy_url = Some("http://proxy.test:3128".into());
        });
        assert_eq!(
            proxied.page("https://site.test/a").proxy.as_deref(),
            Some("http://proxy.test:3128")
        );

        let solver = builder(|c| {
            c.bypass_mode = BypassMode::ChallengeSolver;
            c.proxy_url = Some("http://proxy.test:3128".into());
        });
        assert!(solver.page("https://site.test/a").proxy.is_none());
    }

    #[test]
    fn provider_headers_and_timeout_applied() {
        let b = builder(|c| {
            c.headers.insert("Referer".into(), "https://site.test/".into());
            c.timeout_ms = 2500;
        });
        let req = b.page("https://site.test/film/1");
        assert_eq!(req.header("referer"), Some("https://site.test/"));
        assert!(req.header("user-agent").is_some());
        assert_eq!(req.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn same_request_can_be_resent() {
        let req = builder(|_| {}).search(SearchShape::QueryParam("s"), "q");
        let again = req.clone();
        assert_eq!(req.url, again.url);
        assert_eq!(req.headers, again.headers);
    }
}
