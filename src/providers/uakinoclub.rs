//! uakinoclub: DataLife Engine site behind a bot challenge.
//!
//! Pages render the player in one of two layouts:
//!
//! - `.playlists-ajax`: the playlist is loaded from
//!   `/engine/ajax/playlists.php` as an HTML fragment wrapped in JSON, with
//!   voice-over tracks listed separately from the videos
//! - a plain PlayerJS `iframe`: the embed page carries the whole playlist

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Context;
use futures::future::BoxFuture;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;

use super::site::{absolute_url, default_info_url, SiteContext, SiteDefinition};
use crate::playerjs;
use crate::request::SearchShape;
use crate::selector::{text_of, Field, InfoSpec, Matched, Node, SearchSpec};
use crate::types::{File, FileUrl, SearchResult};

pub const NAME: &str = "uakinoclub";

/// Extractor for the per-episode urls of this site.
pub const EXTRACTOR: &str = "ashdi";

const PLAYER_LAYOUTS: &[&str] = &[".players-section .playlists-ajax", ".players-section iframe"];

/// Result paths that are not titles.
const NON_CONTENT_PREFIXES: &[&str] = &["news", "franchise"];

pub fn definition() -> SiteDefinition {
    SiteDefinition {
        name: NAME,
        search_shape: SearchShape::DataLifeForm,
        search: SearchSpec {
            scope: ".movie-item",
            id: Field::sync(&[".movie-title"], relative_id),
            name: Field::text(".movie-title"),
            image: Field::sync(&[".movie-img img"], |m, ctx| absolute_attr(m, ctx, "src")),
        },
        info: InfoSpec {
            scope: "#dle-content",
            title: Field::text(".solototle"),
            image: Field::sync(&[".film-poster>a"], |m, ctx| absolute_attr(m, ctx, "href")),
            trailer: Field::sync(&["div#overroll"], trailer),
            files: Field::deferred(PLAYER_LAYOUTS, player_files),
        },
        info_url: default_info_url,
        post_process: drop_non_content,
        default_extractor: EXTRACTOR,
    }
}

fn absolute_attr(m: &Matched<'_>, ctx: &SiteContext, name: &str) -> anyhow::Result<String> {
    Ok(ctx.absolute_url(m.attr(name).unwrap_or_default()))
}

/// Link path relative to the site root, url-encoded into one opaque id.
fn relative_id(m: &Matched<'_>, ctx: &SiteContext) -> anyhow::Result<String> {
    let href = m.attr("href").context("title link has no href")?;
    let base = &ctx.config().base_url;
    let path = href.strip_prefix(base.as_str()).unwrap_or(href);
    Ok(urlencoding::encode(path.trim_start_matches('/')).into_owned())
}

fn trailer(m: &Matched<'_>, _: &SiteContext) -> anyhow::Result<Option<String>> {
    let sources: Vec<&str> = m
        .all
        .iter()
        .filter_map(|el| el.value().attr("data-src"))
        .filter(|src| !src.trim().is_empty())
        .collect();
    let preferred = sources
        .iter()
        .find(|src| src.contains("youtube"))
        .or_else(|| sources.first());
    Ok(preferred.map(|src| absolute_url("https://www.youtube.com", src)))
}

fn drop_non_content(results: Vec<SearchResult>) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| !NON_CONTENT_PREFIXES.iter().any(|p| r.id.starts_with(p)))
        .collect()
}

fn player_files(node: Node, ctx: Arc<SiteContext>) -> BoxFuture<'static, anyhow::Result<Vec<File>>> {
    Box::pin(async move {
        match node.selector_index {
            0 => {
                let news_id = node.attr("data-news_id").context("playlist block has no news id")?;
                ajax_playlist(&ctx, news_id).await
            }
            _ => {
                let src = node.attr("src").context("player iframe has no src")?;
                let page = ctx.get_embed(&absolute_url(&ctx.config().base_url, src)).await?;
                playerjs::embed_files(&page, &ctx.config().decode_keys)
                    .context("embed page has no player config")
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct AjaxResponse {
    response: String,
}

async fn ajax_playlist(ctx: &SiteContext, news_id: &str) -> anyhow::Result<Vec<File>> {
    let url = format!(
        "{}/engine/ajax/playlists.php?news_id={news_id}&xfield=playlist",
        ctx.config().base_url
    );
    let body = ctx.get_text(&url).await?;
    let parsed: AjaxResponse = serde_json::from_str(&body).context("playlist response is not JSON")?;
    Ok(playlist_files(&parsed.response))
}

struct Voice {
    prefix: String,
    name: String,
}

/// Group the playlist videos into one file per episode, each url tagged
/// with its voice-over track.
fn playlist_files(fragment: &str) -> Vec<File> {
    let document = Html::parse_fragment(fragment);
    let (Ok(lists), Ok(items), Ok(videos)) = (
        Selector::parse(".playlists-lists .playlists-items"),
        Selector::parse("li"),
        Selector::parse(".playlists-videos .playlists-items li"),
    ) else {
        return Vec::new();
    };

    let voices: Vec<Voice> = document
        .select(&lists)
        .next()
        .map(|list| {
            list.select(&items)
                .filter_map(|li| {
                    Some(Voice {
                        prefix: li.value().attr("data-id")?.to_string(),
                        name: text_of(li),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut episodes: BTreeMap<u32, Vec<FileUrl>> = BTreeMap::new();
    // Unlabelled items are numbered by position within their own voice.
    let mut positions: HashMap<&str, u32> = HashMap::new();
    for li in document.select(&videos) {
        let Some(file) = li.value().attr("data-file").filter(|f| !f.trim().is_empty()) else {
            continue;
        };
        let voice = li
            .value()
            .attr("data-id")
            .and_then(|id| voices.iter().find(|v| id.starts_with(&v.prefix)));
        let position = positions
            .entry(voice.map_or("", |v| v.prefix.as_str()))
            .or_insert(0);
        *position += 1;
        let audio = voice.map(|v| v.name.clone());
        let episode = first_number(&text_of(li)).unwrap_or(*position);
        let url = absolute_url("https://ashdi.vip", file);
        episodes
            .entry(episode)
            .or_default()
            .push(FileUrl::via(url, EXTRACTOR, true).with_audio(audio));
    }

    debug!(voices = voices.len(), episodes = episodes.len(), "Playlist grouped");
    episodes
        .into_iter()
        .map(|(episode, urls)| File::resolved(0, format!("Episode {episode}"), urls))
        .collect()
}

fn first_number(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
