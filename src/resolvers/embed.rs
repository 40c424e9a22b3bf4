//! Generic PlayerJS embed-page resolver.
//!
//! `sourceId` is the embed page URL itself. The page is fetched, its player
//! config decoded, and every stream it lists becomes a url. An `audio`
//! param, when present, labels the returned urls.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;

use super::SourceResolver;
use crate::fingerprint::{random_profile, BrowserProfile};
use crate::http_client::HttpFetch;
use crate::playerjs;
use crate::request::Request;
use crate::types::{FileSource, FileUrl};

/// Extractor types served by this resolver.
pub const KINDS: [&str; 3] = ["ashdi", "playerjs", "tortuga"];

pub struct EmbedResolver {
    kind: &'static str,
    fetcher: Arc<dyn HttpFetch>,
    profile: BrowserProfile,
}

impl EmbedResolver {
    pub fn new(kind: &'static str, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            kind,
            fetcher,
            profile: random_profile(),
        }
    }

    fn request(&self, url: &str, params: &BTreeMap<String, String>) -> Request {
        let mut request = Request::get(url);
        if let Some(referer) = params.get("referer") {
            request = request.with_header("Referer", referer.clone());
        }
        self.profile.fill_missing(&mut request.headers);
        request
    }
}

/// Embed URLs are often protocol-relative.
pub fn normalize_embed_url(url: &str) -> String {
    match url.trim().strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.trim().to_string(),
    }
}

#[async_trait]
impl SourceResolver for EmbedResolver {
    fn kind(&self) -> &str {
        self.kind
    }

    async fn resolve(
        &self,
        source_id: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<FileUrl>> {
        let url = normalize_embed_url(source_id);
        if !url.starts_with("http") {
            bail!("source id {source_id:?} is not an embed URL");
        }

        let response = self.fetcher.fetch(&self.request(&url, params)).await?;
        if !response.is_success() {
            bail!("embed page answered {}", response.status);
        }

        let files = playerjs::embed_files(&response.body, &[]).context("embed page has no player config")?;
        let audio = params.get("audio").cloned();
        Ok(files
            .into_iter()
            .filter_map(|file| match file.source {
                FileSource::Resolved(urls) => Some(urls),
                FileSource::Unresolved(_) => None,
            })
            .flatten()
            .map(|url| if audio.is_some() { url.with_audio(audio.clone()) } else { url })
            .collect())
    }
}
