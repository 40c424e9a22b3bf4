//! On-demand resolution of deferred files.
//!
//! A deferred file carries `{sourceId, params}`; the resolver registered for
//! its extractor type turns that into playable urls when the file is
//! actually opened. Failures here are errors, not empty lists.

pub mod embed;
pub mod voidboost;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::ProviderConfig;
use crate::error::{CrawlError, Result};
use crate::http_client::HttpFetch;
use crate::providers::gidonline;
use crate::types::FileUrl;

/// Turns one async source into playable urls.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Extractor type this resolver is registered under.
    fn kind(&self) -> &str;

    async fn resolve(
        &self,
        source_id: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<FileUrl>>;
}

/// Resolvers keyed by extractor type.
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn SourceResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled resolvers: generic embed scrapers, plus voidboost when a
    /// provider that needs it is configured.
    pub fn builtin(
        providers: &BTreeMap<String, Arc<ProviderConfig>>,
        fetcher: &Arc<dyn HttpFetch>,
    ) -> Self {
        let mut registry = Self::new();
        for kind in embed::KINDS {
            registry.register(Arc::new(embed::EmbedResolver::new(kind, Arc::clone(fetcher))));
        }
        if let Some(config) = providers.get(gidonline::NAME) {
            if config.embed_url.is_some() {
                registry.register(Arc::new(voidboost::VoidboostResolver::new(
                    Arc::clone(config),
                    Arc::clone(fetcher),
                )));
            }
        }
        registry
    }

    /// Add or replace the resolver for its kind.
    pub fn register(&mut self, resolver: Arc<dyn SourceResolver>) {
        self.resolvers.insert(resolver.kind().to_string(), resolver);
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    #[instrument(skip(self, params))]
    pub async fn resolve(
        &self,
        kind: &str,
        source_id: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<FileUrl>> {
        let resolver = self
            .resolvers
            .get(kind)
            .ok_or_else(|| CrawlError::UnknownExtractor(kind.to_string()))?;

        let urls = resolver
            .resolve(source_id, params)
            .await
            .map_err(|e| CrawlError::resolution(kind, format!("{e:#}")))?;
        if urls.is_empty() {
            return Err(CrawlError::resolution(kind, "no playable url found"));
        }

        debug!(count = urls.len(), "Source resolved");
        Ok(urls)
    }
}
