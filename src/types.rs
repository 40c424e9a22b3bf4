//! Consumer-facing result shapes.
//!
//! These serialize with the exact field names the player UI and the chat
//! front-end expect (`asyncSource`, `sourceId`, optional fields omitted when
//! absent), so renaming anything here is a wire break.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One search hit from one provider. `id` is only unique within that
/// provider's result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub image: String,
    pub provider: String,
}

/// Everything known about one title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trailer: Option<String>,
    pub files: Vec<File>,
}

/// Extractor a [`FileUrl`] must pass through before playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extractor {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A playable (or extractor-indirect) location of one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extractor: Option<Extractor>,
    pub hls: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub audio: Option<String>,
}

impl FileUrl {
    /// Directly playable URL; HLS is inferred from the manifest extension.
    pub fn direct(url: impl Into<String>) -> Self {
        let url = url.into();
        let hls = url.contains(".m3u8");
        Self {
            url,
            extractor: None,
            hls,
            audio: None,
        }
    }

    /// URL that must be run through the named extractor first.
    pub fn via(url: impl Into<String>, extractor: &str, hls: bool) -> Self {
        Self {
            url: url.into(),
            extractor: Some(Extractor {
                kind: extractor.to_string(),
            }),
            hls,
            audio: None,
        }
    }

    #[must_use]
    pub fn with_audio(mut self, audio: Option<String>) -> Self {
        self.audio = audio;
        self
    }
}

/// Deferred-resolution pointer: enough to resolve one file on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncSource {
    pub source_id: String,
    pub params: BTreeMap<String, String>,
}

/// Resolution state of a [`File`]. Exactly one of the two is ever present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSource {
    #[serde(rename = "urls")]
    Resolved(Vec<FileUrl>),
    #[serde(rename = "asyncSource")]
    Unresolved(AsyncSource),
}

/// One entry of a title's file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    #[serde(flatten)]
    pub source: FileSource,
}

impl File {
    pub fn resolved(id: u32, name: impl Into<String>, urls: Vec<FileUrl>) -> Self {
        Self {
            id,
            name: name.into(),
            path: None,
            source: FileSource::Resolved(urls),
        }
    }

    pub fn deferred(
        id: u32,
        name: impl Into<String>,
        source_id: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            path: None,
            source: FileSource::Unresolved(AsyncSource {
                source_id: source_id.into(),
                params,
            }),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path = path;
        self
    }

    pub fn urls(&self) -> Option<&[FileUrl]> {
        match &self.source {
            FileSource::Resolved(urls) => Some(urls),
            FileSource::Unresolved(_) => None,
        }
    }

    pub fn async_source(&self) -> Option<&AsyncSource> {
        match &self.source {
            FileSource::Resolved(_) => None,
            FileSource::Unresolved(source) => Some(source),
        }
    }
}

/// Renumber files 1..=n in listing order.
pub(crate) fn renumber(files: &mut [File]) {
    for (id, file) in (1..).zip(files.iter_mut()) {
        file.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolved_file_wire_shape() {
        let file = File::resolved(
            1,
            "Episode 1",
            vec![FileUrl::via("https://ashdi.test/vod/1", "ashdi", true)
                .with_audio(Some("UKR".into()))],
        );
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "name": "Episode 1",
                "urls": [{
                    "url": "https://ashdi.test/vod/1",
                    "extractor": { "type": "ashdi" },
                    "hls": true,
                    "audio": "UKR"
                }]
            })
        );
    }

    #[test]
    fn unresolved_file_wire_shape() {
        let params = BTreeMap::from([("type".to_string(), "movie".to_string())]);
        let file = File::deferred(2, "Dub", "tok123", params).with_path(Some("Dub".into()));
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["asyncSource"]["sourceId"], "tok123");
        assert_eq!(value["asyncSource"]["params"]["type"], "movie");
        assert_eq!(value["path"], "Dub");
        assert!(value.get("urls").is_none());
    }

    #[test]
    fn file_variant_round_trips_from_wire() {
        let raw = r#"{"id":3,"name":"x","asyncSource":{"sourceId":"t","params":{}}}"#;
        let file: File = serde_json::from_str(raw).unwrap();
        assert!(file.urls().is_none());
        assert_eq!(file.async_source().unwrap().source_id, "t");
    }

    #[test]
    fn media_info_omits_missing_trailer() {
        let info = MediaInfo {
            title: "T".into(),
            image: String::new(),
            trailer: None,
            files: vec![],
        };
        let value = serde_json::to_value(&info).unwrap();
        assert!(value.get("trailer").is_none());
    }

    #[test]
    fn direct_url_detects_hls() {
        assert!(FileUrl::direct("https://cdn.test/a/index.m3u8").hls);
        assert!(!FileUrl::direct("https://cdn.test/a.mp4").hls);
    }

    #[test]
    fn renumber_is_one_based() {
        let mut files = vec![
            File::resolved(7, "a", vec![]),
            File::resolved(7, "b", vec![]),
        ];
        renumber(&mut files);
        assert_eq!(files[0].id, 1);
        assert_eq!(files[1].id, 2);
    }
}
