//! Crawler configuration loaded from `~/.config/kinocrawl/providers.toml`.
//!
//! Falls back to the built-in provider set when no user file exists.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{CrawlError, Result};

const DEFAULT_CONFIG: &str = include_str!("../config/providers.toml");

/// How a provider gets past blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BypassMode {
    #[default]
    None,
    /// Route through an HTTP proxy (georestrictions).
    Proxy,
    /// Solve bot challenges through the solver side channel.
    ChallengeSolver,
}

/// Immutable per-provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub search_url: String,
    /// Host of the embedded player, for providers that build player URLs.
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub bypass_mode: BypassMode,
    /// Site charset label (e.g. `windows-1251`); `None` means UTF-8.
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub decode_keys: Vec<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl ProviderConfig {
    /// Minimal config for a site rooted at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            search_url: base_url.trim_end_matches('/').to_string(),
            embed_url: None,
            headers: BTreeMap::new(),
            timeout_ms: default_timeout_ms(),
            bypass_mode: BypassMode::None,
            encoding: None,
            decode_keys: Vec::new(),
            proxy_url: None,
            insecure_tls: false,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolved site charset, if one is configured and known.
    pub fn charset(&self) -> Option<&'static encoding_rs::Encoding> {
        self.encoding
            .as_deref()
            .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
    }
}

/// Challenge solver and proxy settings shared by all providers.
#[derive(Debug, Clone, Deserialize)]
pub struct BypassConfig {
    #[serde(default)]
    pub solver_url: Option<String>,
    #[serde(default = "default_solver_timeout_ms")]
    pub solver_timeout_ms: u64,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

fn default_solver_timeout_ms() -> u64 {
    60_000
}

fn default_token_ttl_secs() -> u64 {
    1800
}

impl Default for BypassConfig {
    fn default() -> Self {
        Self {
            solver_url: None,
            solver_timeout_ms: default_solver_timeout_ms(),
            token_ttl_secs: default_token_ttl_secs(),
            proxy_url: None,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub default_providers: Vec<String>,
    #[serde(default)]
    pub bypass: BypassConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

fn default_page_size() -> usize {
    10
}

impl CrawlerConfig {
    /// The configuration compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG)
    }

    /// Parse and validate a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(text).map_err(|e| CrawlError::Config(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, the user config dir, or the built-in set.
    ///
    /// A missing user file is not an error; an unreadable or invalid one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = config_path();
                if !p.exists() {
                    tracing::debug!("no user config at {}, using built-in", p.display());
                    return Self::builtin();
                }
                p
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))
            .map_err(|e| CrawlError::Config(format!("{e:#}")))?;
        Self::parse(&content)
    }

    fn normalize(&mut self) {
        for provider in self.providers.values_mut() {
            let trimmed = provider.base_url.trim_end_matches('/').len();
            provider.base_url.truncate(trimmed);
            if provider.proxy_url.is_none() {
                provider.proxy_url.clone_from(&self.bypass.proxy_url);
            }
        }
    }

    /// Reject settings no request could be built from.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CrawlError::Config("page_size must be positive".into()));
        }

        for (name, provider) in &self.providers {
            if provider.bypass_mode == BypassMode::Proxy && provider.proxy_url.is_none() {
                return Err(CrawlError::Config(format!(
                    "provider {name}: bypass_mode = \"proxy\" needs a proxy_url"
                )));
            }
            if provider.bypass_mode == BypassMode::ChallengeSolver
                && self.bypass.solver_url.is_none()
            {
                return Err(CrawlError::Config(format!(
                    "provider {name}: bypass_mode = \"challenge-solver\" needs bypass.solver_url"
                )));
            }
            if provider.encoding.is_some() && provider.charset().is_none() {
                return Err(CrawlError::Config(format!(
                    "provider {name}: unknown encoding {:?}",
                    provider.encoding
                )));
            }
        }

        for name in &self.default_providers {
            if !self.providers.contains_key(name) {
                tracing::warn!("default provider {name} has no [providers.{name}] table");
            }
        }

        Ok(())
    }

    /// Freeze provider settings for sharing across concurrent calls.
    pub fn shared_providers(&self) -> BTreeMap<String, Arc<ProviderConfig>> {
        self.providers
            .iter()
            .map(|(name, cfg)| (name.clone(), Arc::new(cfg.clone())))
            .collect()
    }
}

/// Return the path to the user providers file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kinocrawl")
        .join("providers.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_is_valid() {
        let config = CrawlerConfig::builtin().unwrap();
        assert_eq!(config.page_size, 10);
        assert!(config.providers.contains_key("gidonline"));
        assert!(config.providers.contains_key("uakinoclub"));
        assert_eq!(
            config.providers["uakinoclub"].bypass_mode,
            BypassMode::ChallengeSolver
        );
    }

    #[test]
    fn parse_minimal_provider() {
        let toml_str = r#"
[providers.demo]
base_url = "https://demo.test"
search_url = "https://demo.test/search"
"#;
        let config = CrawlerConfig::parse(toml_str).unwrap();
        let demo = &config.providers["demo"];
        assert_eq!(demo.timeout_ms, 10_000);
        assert_eq!(demo.bypass_mode, BypassMode::None);
        assert!(demo.headers.is_empty());
        assert!(demo.charset().is_none());
    }

    #[test]
    fn proxy_mode_inherits_global_proxy() {
        let toml_str = r#"
[bypass]
proxy_url = "http://proxy.test:3128"

[providers.geo]
base_url = "https://geo.test"
search_url = "https://geo.test"
bypass_mode = "proxy"
"#;
        let config = CrawlerConfig::parse(toml_str).unwrap();
        assert_eq!(
            config.providers["geo"].proxy_url.as_deref(),
            Some("http://proxy.test:3128")
        );
    }

    #[test]
    fn proxy_mode_without_proxy_is_rejected() {
        let toml_str = r#"
[providers.geo]
base_url = "https://geo.test"
search_url = "https://geo.test"
bypass_mode = "proxy"
"#;
        let err = CrawlerConfig::parse(toml_str).unwrap_err();
        assert!(matches!(err, CrawlError::Config(_)));
    }

    #[test]
    fn solver_mode_needs_solver_url() {
        let toml_str = r#"
[providers.cf]
base_url = "https://cf.test"
search_url = "https://cf.test"
bypass_mode = "challenge-solver"
"#;
        assert!(CrawlerConfig::parse(toml_str).is_err());
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let toml_str = r#"
[providers.x]
base_url = "https://x.test"
search_url = "https://x.test"
encoding = "klingon-8"
"#;
        assert!(CrawlerConfig::parse(toml_str).is_err());
    }

    #[test]
    fn known_encoding_resolves() {
        let mut cfg = ProviderConfig::new("https://x.test/");
        cfg.encoding = Some("windows-1251".into());
        assert_eq!(cfg.charset(), Some(encoding_rs::WINDOWS_1251));
        assert_eq!(cfg.base_url, "https://x.test");
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("providers.toml");
        std::fs::write(&path, "page_size = 3\n").unwrap();
        let config = CrawlerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.page_size, 3);
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        let err = CrawlerConfig::load(Some(Path::new("/nonexistent/kinocrawl.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
