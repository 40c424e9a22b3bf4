//! Site bindings.
//!
//! # Architecture
//!
//! - [`MediaProvider`]: async capability set the aggregator works against
//! - [`CrawlerProvider`]: the one implementation, composed from a
//!   [`SiteDefinition`] and a [`SiteContext`]
//! - [`builtin_definition`]: looks up the bundled site definitions by name
//!
//! Sites differ only by data: selector specs, request shape, bypass mode
//! and the post-process hook.

pub mod gidonline;
pub mod site;
pub mod uakinoclub;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::bypass::BypassLayer;
use crate::config::ProviderConfig;
use crate::error::{CrawlError, Result};
use crate::http_client::HttpFetch;
use crate::types::{renumber, MediaInfo, SearchResult};

pub use site::{SiteContext, SiteDefinition};

/// Search and info lookup against one external site.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Extractor that resolves this provider's unresolved files.
    fn default_extractor(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;

    async fn get_info(&self, id: &str) -> Result<MediaInfo>;
}

/// Names of every bundled site definition.
pub const BUILTIN: &[&str] = &[gidonline::NAME, uakinoclub::NAME];

/// Bundled site definition for `name`.
pub fn builtin_definition(name: &str) -> Option<SiteDefinition> {
    match name {
        gidonline::NAME => Some(gidonline::definition()),
        uakinoclub::NAME => Some(uakinoclub::definition()),
        _ => None,
    }
}

/// A [`SiteDefinition`] bound to its config, fetcher and bypass layer.
pub struct CrawlerProvider {
    definition: SiteDefinition,
    context: Arc<SiteContext>,
}

impl CrawlerProvider {
    pub fn new(
        definition: SiteDefinition,
        config: Arc<ProviderConfig>,
        fetcher: Arc<dyn HttpFetch>,
        bypass: Option<Arc<BypassLayer>>,
    ) -> Result<Self> {
        definition.validate()?;
        let context = Arc::new(SiteContext::new(definition.name, config, fetcher, bypass));
        Ok(Self {
            definition,
            context,
        })
    }

    pub fn context(&self) -> &SiteContext {
        &self.context
    }

    /// Info page URL for `id`.
    pub fn info_url(&self, id: &str) -> String {
        (self.definition.info_url)(self.context.config(), id)
    }
}

#[async_trait]
impl MediaProvider for CrawlerProvider {
    fn name(&self) -> &str {
        self.definition.name
    }

    fn default_extractor(&self) -> &str {
        self.definition.default_extractor
    }

    #[instrument(skip(self), fields(provider = self.definition.name))]
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let request = self
            .context
            .requests
            .search(self.definition.search_shape, query);
        let html = self.context.send(&request).await?.body;

        let results: Vec<SearchResult> = self
            .definition
            .search
            .extract(&html, self.definition.name, &self.context)
            .await
            .into_iter()
            .filter(|r| !r.id.is_empty())
            .collect();
        let results = (self.definition.post_process)(results);

        info!(count = results.len(), "Search finished");
        Ok(results)
    }

    #[instrument(skip(self), fields(provider = self.definition.name))]
    async fn get_info(&self, id: &str) -> Result<MediaInfo> {
        let url = self.info_url(id);
        let html = self.context.get_text(&url).await?;

        let mut info = self
            .definition
            .info
            .extract(&html, &self.context)
            .await
            .ok_or_else(|| CrawlError::MissingScope {
                provider: self.definition.name.to_string(),
                scope: self.definition.info.scope.to_string(),
                url: url.clone(),
            })?;
        renumber(&mut info.files);

        info!(files = info.files.len(), "Info extracted");
        Ok(info)
    }
}
