//! voidboost player resolver for gidonline's deferred files.
//!
//! Params: `type` (`movie`, `embed` or `serial`) picks the player page
//! shape; `s`/`e` select the episode of a series. The player's file string
//! is obfuscated with the provider's decode keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tracing::debug;

use super::SourceResolver;
use crate::config::ProviderConfig;
use crate::http_client::HttpFetch;
use crate::playerjs::{decode_file, parse_quality_list, player_file, PlayerFile};
use crate::providers::gidonline::{iframe_url, EXTRACTOR};
use crate::request::RequestBuilder;
use crate::script::inline_scripts;
use crate::types::FileUrl;

pub struct VoidboostResolver {
    requests: RequestBuilder,
    fetcher: Arc<dyn HttpFetch>,
}

impl VoidboostResolver {
    pub fn new(config: Arc<ProviderConfig>, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            requests: RequestBuilder::new(config),
            fetcher,
        }
    }

    /// Player page for one source.
    pub fn player_url(&self, token: &str, params: &BTreeMap<String, String>) -> anyhow::Result<String> {
        let embed_base = self
            .requests
            .config()
            .embed_url
            .as_deref()
            .context("embed_url is not configured")?;
        let kind = params.get("type").map_or("movie", String::as_str);
        let mut url = iframe_url(embed_base, token, kind);
        for key in ["s", "e"] {
            if let Some(value) = params.get(key) {
                url.push_str(&format!("&{key}={}", urlencoding::encode(value)));
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl SourceResolver for VoidboostResolver {
    fn kind(&self) -> &str {
        EXTRACTOR
    }

    async fn resolve(
        &self,
        source_id: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<FileUrl>> {
        if source_id.trim().is_empty() {
            bail!("empty translation token");
        }
        let url = self.player_url(source_id, params)?;
        let response = self.fetcher.fetch(&self.requests.page(&url)).await?;
        if !response.is_success() {
            bail!("player page answered {}", response.status);
        }

        let file = inline_scripts(&response.body)
            .iter()
            .find_map(|script| player_file(script))
            .context("player page has no player config")?;
        let PlayerFile::Source(encoded) = file else {
            bail!("player config holds a playlist, expected a single source");
        };

        let decoded = decode_file(&encoded, &self.requests.config().decode_keys)?;
        let urls = parse_quality_list(&decoded);
        debug!(qualities = urls.len(), "Player source decoded");
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFetcher;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    const KEY: &str = "@@@@@!##!^^^";

    fn resolver(fetcher: Arc<ScriptedFetcher>) -> VoidboostResolver {
        let mut config = ProviderConfig::new("https://gid.test");
        config.embed_url = Some("https://player.test".into());
        config.decode_keys = vec!["$$#!!@#!@##".into(), KEY.into()];
        VoidboostResolver::new(Arc::new(config), fetcher)
    }

    fn player_page(plain: &str) -> String {
        let encoded = STANDARD.encode(plain);
        let (head, tail) = encoded.split_at(10);
        let file = format!("#h{head}//_//{}{tail}", STANDARD.encode(KEY));
        format!(r#"<html><body><script>var player = new Playerjs({{id:"cdnplayer", file:"{file}"}});</script></body></html>"#)
    }

    #[test]
    fn player_url_carries_episode() {
        let r = resolver(Arc::new(ScriptedFetcher::new()));
        let params = BTreeMap::from([
            ("type".to_string(), "serial".to_string()),
            ("s".to_string(), "2".to_string()),
            ("e".to_string(), "5".to_string()),
        ]);
        let url = r.player_url("tok", &params).unwrap();
        assert!(url.starts_with("https://player.test/serial/tok/iframe?"));
        assert!(url.ends_with("&s=2&e=5"));
        assert!(r
            .player_url("77", &BTreeMap::new())
            .unwrap()
            .starts_with("https://player.test/movie/77/iframe?"));
    }

    #[tokio::test]
    async fn decodes_obfuscated_quality_list() {
        let page = player_page("[480p]https://cdn.test/480.mp4:hls:manifest.m3u8,[720p]https://cdn.test/720.mp4:hls:manifest.m3u8");
        let fetcher = Arc::new(ScriptedFetcher::new().route("player.test/movie/tok1", 200, &page));
        let params = BTreeMap::from([("type".to_string(), "movie".to_string())]);

        let urls = resolver(fetcher).resolve("tok1", &params).await.unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1].url, "https://cdn.test/720.mp4:hls:manifest.m3u8");
        assert!(urls.iter().all(|u| u.hls));
    }

    #[tokio::test]
    async fn missing_player_config_is_an_error() {
        let fetcher = Arc::new(ScriptedFetcher::new().route("player.test", 200, "<html>removed</html>"));
        let err = resolver(fetcher)
            .resolve("tok1", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no player config"));
    }
}
