//! gidonline: GET search, voidboost player with per-translation season maps.
//!
//! The info page embeds a voidboost iframe. The iframe lists translations
//! (`#translator-name > option[data-token]`) and, for series, assigns a
//! `seasons_episodes` map in an inline script. Movies become one deferred
//! file per translation; series become one deferred file per episode,
//! namespaced by translation (and by season when there is more than one).

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use futures::future::{join_all, BoxFuture};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::site::{absolute_url, default_info_url, keep_all, last_path_part, SiteContext, SiteDefinition};
use crate::config::ProviderConfig;
use crate::request::SearchShape;
use crate::script::extract_object;
use crate::selector::{Field, InfoSpec, Matched, Node, SearchSpec};
use crate::types::File;

pub const NAME: &str = "gidonline";

/// Extractor that resolves this site's deferred files.
pub const EXTRACTOR: &str = "voidboost";

/// Query the player host expects from this partner site.
const PARTNER_QUERY: &str = "h=gidonline.io&df=1&vstop=7&vsleft=44&partner=gidonline";

static BLOCKED_COUNTRIES: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"&block=[a-z,]+").ok());

/// Season number to episode numbers, as the player script declares it.
type SeasonMap = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, PartialEq)]
struct Translation {
    name: String,
    token: String,
}

pub fn definition() -> SiteDefinition {
    SiteDefinition {
        name: NAME,
        search_shape: SearchShape::QueryParam("s"),
        search: SearchSpec {
            scope: ".mainlink",
            id: Field::sync(&[], |m, _| Ok(last_path_part(m.attr("href").unwrap_or_default()))),
            name: Field::sync(&[], title_with_year),
            image: Field::sync(&["img"], image_src),
        },
        info: InfoSpec {
            scope: "#main",
            title: Field::text("#single > .t-row > .r-1 > .rl-2"),
            image: Field::sync(&["#single > img.t-img"], image_src),
            trailer: Field::sync(&[], |_, _| Ok(None)),
            files: Field::deferred(&["#cdn-player"], player_files),
        },
        info_url,
        post_process: keep_all,
        default_extractor: EXTRACTOR,
    }
}

fn info_url(config: &ProviderConfig, id: &str) -> String {
    if id.starts_with("http") {
        return default_info_url(config, id);
    }
    format!("{}/film/{id}", config.base_url)
}

fn title_with_year(m: &Matched<'_>, _: &SiteContext) -> anyhow::Result<String> {
    let title = m.find_text("span");
    let year = m.find_text(".mqn");
    Ok(if year.is_empty() {
        title
    } else {
        format!("{title} ({year})")
    })
}

fn image_src(m: &Matched<'_>, ctx: &SiteContext) -> anyhow::Result<String> {
    Ok(ctx.absolute_url(m.attr("src").unwrap_or_default()))
}

/// Player page URL for a translation token. `kind` is `embed`, `movie` or
/// `serial`.
pub fn iframe_url(embed_base: &str, token: &str, kind: &str) -> String {
    let embed_base = embed_base.trim_end_matches('/');
    let path = if kind == "embed" {
        format!("{embed_base}/embed/{token}")
    } else {
        format!("{embed_base}/{kind}/{token}/iframe")
    };
    format!("{path}?{PARTNER_QUERY}")
}

fn strip_blocked_countries(url: &str) -> String {
    match BLOCKED_COUNTRIES.as_ref() {
        Some(re) => re.replace_all(url, "").into_owned(),
        None => url.to_string(),
    }
}

fn embed_id(url: &str) -> Option<String> {
    let start = url.find("embed/")? + "embed/".len();
    let digits: String = url[start..].chars().take_while(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

fn translations(page: &str) -> Vec<Translation> {
    let Ok(selector) = Selector::parse("#translator-name > option") else {
        return Vec::new();
    };
    Html::parse_document(page)
        .select(&selector)
        .filter_map(|el| {
            let token = el.value().attr("data-token")?.trim();
            (!token.is_empty()).then(|| Translation {
                name: el.text().collect::<String>().trim().to_string(),
                token: token.to_string(),
            })
        })
        .collect()
}

fn player_files(node: Node, ctx: Arc<SiteContext>) -> BoxFuture<'static, anyhow::Result<Vec<File>>> {
    Box::pin(async move {
        let Some(src) = node.attr("src") else {
            return Ok(Vec::new());
        };
        let iframe = strip_blocked_countries(&absolute_url(&ctx.config().base_url, src));
        let page = ctx
            .get_embed(&iframe)
            .await
            .with_context(|| format!("player page {iframe}"))?;

        let mut translations = translations(&page);
        let seasons: Option<SeasonMap> = extract_object(&page, "seasons_episodes");
        let embed = embed_id(&iframe);

        let Some(seasons) = seasons else {
            if translations.is_empty() {
                return Ok(embed.map(|id| vec![movie_file("Default", &id, "embed")]).unwrap_or_default());
            }
            return Ok(translations
                .iter()
                .map(|t| movie_file(&t.name, &t.token, "movie"))
                .collect());
        };

        let embed = embed.context("player URL carries no embed id")?;
        if translations.is_empty() {
            translations.push(Translation {
                name: "Default".into(),
                token: embed.clone(),
            });
        } else {
            translations[0].token = embed;
        }

        let mut files = episode_files(&translations[0], &seasons, "embed");

        let embed_base = ctx.config().embed_url.clone().unwrap_or_default();
        let others = join_all(translations[1..].iter().map(|translation| {
            let ctx = Arc::clone(&ctx);
            let embed_base = embed_base.clone();
            async move {
                match load_seasons(&ctx, &embed_base, translation).await {
                    Ok(map) => episode_files(translation, &map, "serial"),
                    Err(e) => {
                        warn!(translation = %translation.name, token = %translation.token, "Dropping translation: {e:#}");
                        Vec::new()
                    }
                }
            }
        }))
        .await;

        files.extend(others.into_iter().flatten());
        debug!(translations = translations.len(), files = files.len(), "Player listing built");
        Ok(files)
    })
}

async fn load_seasons(ctx: &SiteContext, embed_base: &str, translation: &Translation) -> anyhow::Result<SeasonMap> {
    if embed_base.is_empty() {
        anyhow::bail!("embed_url is not configured");
    }
    let url = iframe_url(embed_base, &translation.token, "serial");
    let page = ctx.get_embed(&url).await?;
    extract_object(&page, "seasons_episodes").context("translation page has no season map")
}

fn movie_file(name: &str, token: &str, kind: &str) -> File {
    let params = BTreeMap::from([("type".to_string(), kind.to_string())]);
    File::deferred(0, name, token, params)
}

fn episode_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Seasons in numeric order; non-numeric keys sort last, by name.
fn ordered_seasons(seasons: &SeasonMap) -> Vec<(&String, &Vec<Value>)> {
    let mut ordered: Vec<_> = seasons.iter().collect();
    ordered.sort_by(|a, b| season_key(a.0).cmp(&season_key(b.0)));
    ordered
}

fn season_key(season: &str) -> (u32, &str) {
    (season.parse().unwrap_or(u32::MAX), season)
}

/// One deferred file per episode. A single season is flattened under the
/// translation; several seasons get `translation/Season N` paths.
fn episode_files(translation: &Translation, seasons: &SeasonMap, kind: &str) -> Vec<File> {
    let ordered = ordered_seasons(seasons);
    let single = ordered.len() == 1;
    let mut files = Vec::new();

    for (season, episodes) in ordered {
        let path = if single {
            translation.name.clone()
        } else {
            format!("{}/Season {season}", translation.name)
        };
        for episode in episodes {
            let episode = episode_label(episode);
            let params = BTreeMap::from([
                ("type".to_string(), kind.to_string()),
                ("s".to_string(), season.clone()),
                ("e".to_string(), episode.clone()),
            ]);
            files.push(
                File::deferred(0, format!("Episode {episode}"), &translation.token, params)
                    .with_path(Some(path.clone())),
            );
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CrawlerProvider, MediaProvider};
    use crate::testing::ScriptedFetcher;

    const SEARCH_PAGE: &str = r#"<html><body>
        <a class="mainlink" href="https://gid.test/film/matrix/">
            <img src="/posters/matrix.jpg"><span>Матрица</span><span class="mqn">1999</span>
        </a>
        <a class="mainlink" href="https://gid.test/film/dark/">
            <img src="//cdn.test/dark.jpg"><span>Тьма</span><span class="mqn">2017</span>
        </a>
    </body></html>"#;

    fn info_page(iframe: &str) -> String {
        format!(
            r#"<html><body><div id="main"><div id="single">
                <img class="t-img" src="/posters/matrix.jpg">
                <div class="t-row"><div class="r-1"><div class="rl-2"> Матрица </div></div></div>
            </div>
            <iframe id="cdn-player" src="{iframe}"></iframe></div></body></html>"#
        )
    }

    const TRANSLATORS: &str = r#"<select id="translator-name">
        <option data-token="tok1">Дубляж</option>
        <option data-token="tok2">Многоголосый</option>
        <option data-token="tok3">Оригинал</option>
    </select>"#;

    fn provider(fetcher: Arc<ScriptedFetcher>) -> CrawlerProvider {
        let mut config = ProviderConfig::new("https://gid.test");
        config.embed_url = Some("https://player.test".into());
        CrawlerProvider::new(definition(), Arc::new(config), fetcher, None).unwrap()
    }

    #[tokio::test]
    async fn search_extracts_id_name_and_absolute_image() {
        let fetcher = Arc::new(ScriptedFetcher::new().route("gid.test?s=", 200, SEARCH_PAGE));
        let results = provider(fetcher.clone()).search("матрица").await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "matrix");
        assert_eq!(results[0].name, "Матрица (1999)");
        assert_eq!(results[0].image, "https://gid.test/posters/matrix.jpg");
        assert_eq!(results[1].image, "https://cdn.test/dark.jpg");
        assert_eq!(results[1].provider, NAME);
        assert!(fetcher.last_request().unwrap().url.ends_with(&format!(
            "?s={}",
            urlencoding::encode("матрица")
        )));
    }

    #[tokio::test]
    async fn movie_has_one_deferred_file_per_translation() {
        let player = format!("<html><body>{TRANSLATORS}<script>var x = 1;</script></body></html>");
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .route("player.test/embed/77", 200, &player)
                .route("gid.test/film/matrix", 200, &info_page("https://player.test/embed/77?a=1&block=ru,ua")),
        );
        let info = provider(fetcher.clone()).get_info("matrix").await.unwrap();

        assert_eq!(info.title, "Матрица");
        assert_eq!(info.image, "https://gid.test/posters/matrix.jpg");
        assert_eq!(info.files.len(), 3);
        let source = info.files[1].async_source().unwrap();
        assert_eq!(source.source_id, "tok2");
        assert_eq!(source.params["type"], "movie");
        assert_eq!(info.files[1].name, "Многоголосый");
        assert_eq!(fetcher.calls_to("block="), 0);
    }

    #[tokio::test]
    async fn single_season_is_flattened() {
        let player = format!(
            r#"<html><body><select id="translator-name"><option data-token="tok1">Дубляж</option></select>
            <script>var seasons_episodes = {{"1":[1,2,3]}};</script></body></html>"#
        );
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .route("player.test/embed/5", 200, &player)
                .route("gid.test/film/dark", 200, &info_page("https://player.test/embed/5")),
        );
        let info = provider(fetcher).get_info("dark").await.unwrap();

        let names: Vec<&str> = info.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Episode 1", "Episode 2", "Episode 3"]);
        assert!(info.files.iter().all(|f| f.path.as_deref() == Some("Дубляж")));
        let source = info.files[2].async_source().unwrap();
        assert_eq!(source.source_id, "5");
        assert_eq!(source.params["type"], "embed");
        assert_eq!(source.params["s"], "1");
        assert_eq!(source.params["e"], "3");
    }

    #[tokio::test]
    async fn failing_translation_is_dropped_and_seasons_namespaced() {
        let player = format!(
            r#"<html><body>{TRANSLATORS}
            <script>var seasons_episodes = {{"2":[1],"1":[1,2]}};</script></body></html>"#
        );
        let serial = r#"<script>var seasons_episodes = {"1":[1]};</script>"#;
        let fetcher = Arc::new(
            ScriptedFetcher::new()
                .route("player.test/embed/9", 200, &player)
                .route("player.test/serial/tok2/iframe", 200, serial)
                .fail("player.test/serial/tok3")
                .route("gid.test/film/dark", 200, &info_page("https://player.test/embed/9")),
        );
        let provider = provider(fetcher);
        let info = provider.get_info("dark").await.unwrap();

        let listing: Vec<(u32, &str, &str)> = info
            .files
            .iter()
            .map(|f| (f.id, f.path.as_deref().unwrap_or_default(), f.name.as_str()))
            .collect();
        assert_eq!(
            listing,
            vec![
                (1, "Дубляж/Season 1", "Episode 1"),
                (2, "Дубляж/Season 1", "Episode 2"),
                (3, "Дубляж/Season 2", "Episode 1"),
                (4, "Многоголосый", "Episode 1"),
            ]
        );
        assert_eq!(info.files[3].async_source().unwrap().params["type"], "serial");

        let again = provider.get_info("dark").await.unwrap();
        assert_eq!(again, info);
    }

    #[test]
    fn iframe_urls_carry_partner_query() {
        assert_eq!(
            iframe_url("https://player.test/", "12", "embed"),
            format!("https://player.test/embed/12?{PARTNER_QUERY}")
        );
        assert_eq!(
            iframe_url("https://player.test", "abc", "serial"),
            format!("https://player.test/serial/abc/iframe?{PARTNER_QUERY}")
        );
    }

    #[test]
    fn info_url_for_slug_and_full_url() {
        let config = ProviderConfig::new("https://gid.test");
        assert_eq!(info_url(&config, "matrix"), "https://gid.test/film/matrix");
        assert_eq!(info_url(&config, "https://gid.test/film/x/"), "https://gid.test/film/x/");
    }

    #[test]
    fn embed_id_needs_digits() {
        assert_eq!(embed_id("https://p.test/embed/123?x=1").as_deref(), Some("123"));
        assert_eq!(embed_id("https://p.test/embed/abc"), None);
    }
}
