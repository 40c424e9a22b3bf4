//! PlayerJS embed configuration.
//!
//! Embedded players are configured with `new Playerjs({ file: ... })`, where
//! `file` is one of:
//!
//! - a quality list `[720p]https://a/720.m3u8 or https://b/720.m3u8,[1080p]...`
//! - a playlist of `{title, file}` items, nested through `{title, folder}`
//! - either of the above obfuscated as `#h<base64 with //_// garbage>`

use anyhow::{bail, Context};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::script::{balanced, inline_scripts};
use crate::types::{renumber, File, FileUrl};

static FILE_KEY: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?:^|[{,\s])["']?file["']?\s*:\s*"#).ok());

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const GARBAGE_MARK: &str = "//_//";

/// One entry of a PlayerJS playlist.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub folder: Option<Vec<PlaylistItem>>,
}

/// The `file` property of a player config.
#[derive(Debug, Clone)]
pub enum PlayerFile {
    Source(String),
    Playlist(Vec<PlaylistItem>),
}

/// Locate the player's `file` property in script text.
pub fn player_file(script: &str) -> Option<PlayerFile> {
    let start = script.find("Playerjs(").unwrap_or(0);
    let text = &script[start..];
    let key = FILE_KEY.as_ref()?;

    key.find_iter(text).find_map(|m| {
        let value = &text[m.end()..];
        match value.chars().next()? {
            '[' => parse_playlist(balanced(value)?).map(PlayerFile::Playlist),
            '"' | '\'' => {
                let literal = string_literal(value)?;
                if literal.trim_start().starts_with("[{") {
                    parse_playlist(&literal).map(PlayerFile::Playlist)
                } else {
                    Some(PlayerFile::Source(literal))
                }
            }
            _ => None,
        }
    })
}

fn parse_playlist(json: &str) -> Option<Vec<PlaylistItem>> {
    match serde_json::from_str(json) {
        Ok(items) => Some(items),
        Err(e) => {
            debug!("Player playlist is not JSON: {e}");
            None
        }
    }
}

/// Contents of the JS string literal opening `s`, unescaped.
fn string_literal(s: &str) -> Option<String> {
    let mut chars = s.chars();
    let quote = chars.next()?;
    let mut out = String::new();
    let mut escaped = false;
    for c in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
    None
}

/// Undo `#h` obfuscation: drop the prefix, strip `//_//<base64(key)>`
/// garbage for every known key, then base64-decode. Plain strings pass
/// through unchanged.
pub fn decode_file(file: &str, keys: &[String]) -> anyhow::Result<String> {
    let Some(payload) = file.strip_prefix("#h").or_else(|| file.strip_prefix("#2")) else {
        return Ok(file.to_string());
    };

    let mut payload = payload.to_string();
    for key in keys {
        payload = payload.replace(&format!("{GARBAGE_MARK}{}", STANDARD.encode(key)), "");
    }
    payload = payload.replace(GARBAGE_MARK, "");

    let bytes = LENIENT
        .decode(payload.trim())
        .context("obfuscated player file is not base64")?;
    let decoded = String::from_utf8(bytes).context("decoded player file is not UTF-8")?;
    if decoded.is_empty() {
        bail!("obfuscated player file decoded to nothing");
    }
    Ok(decoded)
}

/// Split a quality list into its entries, keeping source order. Each
/// entry's first mirror (`a or b`) wins.
pub fn parse_quality_list(file: &str) -> Vec<FileUrl> {
    let mut urls = Vec::new();
    let mut rest = file.trim().trim_start_matches(',');

    while !rest.is_empty() {
        let body = match rest.strip_prefix('[').and_then(|r| r.split_once(']')) {
            Some((_quality, body)) => body,
            None => rest,
        };
        let end = body.find(",[").unwrap_or(body.len());
        let entry = body[..end].trim().trim_end_matches(',');

        if let Some(url) = entry.split(" or ").map(str::trim).find(|u| !u.is_empty()) {
            urls.push(FileUrl::direct(url));
        }
        rest = body[end..].trim_start_matches(',');
    }

    urls
}

/// Files of a player config; playlist folders become `path` segments.
pub fn files_from_player(file: &PlayerFile, keys: &[String]) -> Vec<File> {
    let mut files = Vec::new();
    match file {
        PlayerFile::Source(source) => match decode_file(source, keys) {
            Ok(decoded) if decoded.trim_start().starts_with("[{") => {
                if let Some(items) = parse_playlist(&decoded) {
                    collect(&items, None, keys, &mut files);
                }
            }
            Ok(decoded) => {
                let urls = parse_quality_list(&decoded);
                if !urls.is_empty() {
                    files.push(File::resolved(0, "Video", urls));
                }
            }
            Err(e) => warn!("Skipping player source: {e:#}"),
        },
        PlayerFile::Playlist(items) => collect(items, None, keys, &mut files),
    }
    renumber(&mut files);
    files
}

fn collect(items: &[PlaylistItem], path: Option<&str>, keys: &[String], out: &mut Vec<File>) {
    for item in items {
        let title = item.title.trim();
        if let Some(folder) = &item.folder {
            let nested = match path {
                Some(parent) => format!("{parent}/{title}"),
                None => title.to_string(),
            };
            collect(folder, Some(&nested), keys, out);
        } else if let Some(file) = &item.file {
            let urls = match decode_file(file, keys) {
                Ok(decoded) => parse_quality_list(&decoded),
                Err(e) => {
                    warn!(title, "Skipping playlist item: {e:#}");
                    continue;
                }
            };
            if !urls.is_empty() {
                out.push(File::resolved(0, title, urls).with_path(path.map(str::to_string)));
            }
        }
    }
}

/// Files of the first PlayerJS config found in the page's inline scripts.
/// `None` if the page has no player config.
pub fn embed_files(html: &str, keys: &[String]) -> Option<Vec<File>> {
    inline_scripts(html)
        .iter()
        .find_map(|script| player_file(script))
        .map(|file| files_from_player(&file, keys))
}
