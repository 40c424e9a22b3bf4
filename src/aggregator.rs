//! Multi-provider entry point.
//!
//! [`Crawler`] owns the configured providers and resolvers and exposes the
//! four inbound operations: fan-out search, single-provider info lookup,
//! on-demand source resolution, and paging over a [`SearchSession`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::bypass::{BypassLayer, SolverClient};
use crate::config::CrawlerConfig;
use crate::error::{CrawlError, Result};
use crate::http_client::{HttpClient, HttpFetch};
use crate::paging::{page, Page, SearchSession};
use crate::providers::{builtin_definition, CrawlerProvider, MediaProvider};
use crate::resolvers::{ResolverRegistry, SourceResolver};
use crate::types::{File, FileSource, FileUrl, MediaInfo, SearchResult};

pub struct Crawler {
    providers: HashMap<String, Arc<dyn MediaProvider>>,
    resolvers: ResolverRegistry,
    default_providers: Vec<String>,
    page_size: usize,
}

impl Crawler {
    /// Crawler with no providers or resolvers.
    pub fn new(page_size: usize) -> Self {
        Self {
            providers: HashMap::new(),
            resolvers: ResolverRegistry::new(),
            default_providers: Vec::new(),
            page_size,
        }
    }

    /// Every configured provider that has a bundled site definition, over
    /// the reqwest client.
    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let fetcher: Arc<dyn HttpFetch> = Arc::new(HttpClient::new()?);
        Self::with_fetcher(config, fetcher)
    }

    /// Same as [`Crawler::from_config`] over any fetch capability.
    pub fn with_fetcher(config: &CrawlerConfig, fetcher: Arc<dyn HttpFetch>) -> Result<Self> {
        let bypass = config.bypass.solver_url.as_ref().map(|url| {
            let solver = SolverClient::new(
                Arc::clone(&fetcher),
                url.clone(),
                Duration::from_millis(config.bypass.solver_timeout_ms),
                Duration::from_secs(config.bypass.token_ttl_secs),
            );
            Arc::new(BypassLayer::new(Arc::new(solver)))
        });

        let shared = config.shared_providers();
        let mut crawler = Self::new(config.page_size);
        crawler.default_providers.clone_from(&config.default_providers);
        crawler.resolvers = ResolverRegistry::builtin(&shared, &fetcher);

        for (name, provider_config) in &shared {
            let Some(definition) = builtin_definition(name) else {
                warn!(provider = %name, "No site definition, skipping");
                continue;
            };
            let provider = CrawlerProvider::new(
                definition,
                Arc::clone(provider_config),
                Arc::clone(&fetcher),
                bypass.clone(),
            )?;
            crawler.register_provider(Arc::new(provider));
        }

        info!(providers = crawler.providers.len(), "Crawler ready");
        Ok(crawler)
    }

    pub fn register_provider(&mut self, provider: Arc<dyn MediaProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn register_resolver(&mut self, resolver: Arc<dyn SourceResolver>) {
        self.resolvers.register(resolver);
    }

    #[must_use]
    pub fn with_default_providers(mut self, names: Vec<String>) -> Self {
        self.default_providers = names;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn extractor_kinds(&self) -> Vec<&str> {
        self.resolvers.kinds()
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn MediaProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| CrawlError::UnknownProvider(name.to_string()))
    }

    /// Search every named provider concurrently (the default set when
    /// `names` is empty). Failing, empty and unknown providers are left
    /// out; the rest keep the caller's order.
    #[instrument(skip(self))]
    pub async fn search(&self, names: &[String], query: &str) -> Vec<Vec<SearchResult>> {
        let names = if names.is_empty() {
            self.default_providers.as_slice()
        } else {
            names
        };

        let searches = names.iter().map(|name| async move {
            let Ok(provider) = self.provider(name) else {
                warn!(provider = %name, "Unknown provider, skipping");
                return None;
            };
            match provider.search(query).await {
                Ok(results) if results.is_empty() => {
                    debug!(provider = %name, "No results");
                    None
                }
                Ok(results) => Some(results),
                Err(e) => {
                    warn!(provider = %name, "Search failed: {e}");
                    None
                }
            }
        });

        join_all(searches).await.into_iter().flatten().collect()
    }

    /// Fan out `query` and wrap the results in a new session.
    pub async fn start_session(&self, names: &[String], query: &str) -> SearchSession {
        SearchSession::new(query, self.search(names, query).await)
    }

    /// Page `number` of `session` at this crawler's page size.
    pub fn page(&self, session: &SearchSession, number: usize) -> Page {
        page(&session.provider_results, number, self.page_size)
    }

    pub async fn get_info(&self, provider: &str, id: &str) -> Result<MediaInfo> {
        self.provider(provider)?.get_info(id).await
    }

    pub async fn resolve_source(
        &self,
        extractor: &str,
        source_id: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Vec<FileUrl>> {
        self.resolvers.resolve(extractor, source_id, params).await
    }

    /// Playable urls of one file from `provider`'s listing. Deferred files
    /// go through the provider's extractor; extractor-indirect urls go
    /// through theirs.
    pub async fn resolve_file(&self, provider: &str, file: &File) -> Result<Vec<FileUrl>> {
        match &file.source {
            FileSource::Unresolved(source) => {
                let extractor = self.provider(provider)?.default_extractor().to_string();
                self.resolve_source(&extractor, &source.source_id, &source.params)
                    .await
            }
            FileSource::Resolved(urls) => self.resolve_indirect(urls).await,
        }
    }

    async fn resolve_indirect(&self, urls: &[FileUrl]) -> Result<Vec<FileUrl>> {
        let resolved = join_all(urls.iter().map(|url| async move {
            let Some(extractor) = &url.extractor else {
                return Ok(vec![url.clone()]);
            };
            let mut params = BTreeMap::new();
            if let Some(audio) = &url.audio {
                params.insert("audio".to_string(), audio.clone());
            }
            self.resolve_source(&extractor.kind, &url.url, &params).await
        }))
        .await;

        let mut playable = Vec::new();
        let mut last_error = None;
        for result in resolved {
            match result {
                Ok(urls) => playable.extend(urls),
                Err(e) => {
                    warn!("Skipping url: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if playable.is_empty() => Err(e),
            _ => Ok(playable),
        }
    }
}
