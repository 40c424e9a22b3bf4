//! Declarative field extraction over parsed HTML.
//!
//! A [`Field`] is one or more CSS selectors plus a transform. Sync
//! transforms run against the live DOM; async transforms get an owned
//! [`Node`] snapshot so the parsed document is never held across an await.
//! A transform that fails degrades only its own field to the type's default.
//!
//! Transforms are plain functions taking an explicit context `C` (site base
//! URL, headers, a fetch handle), never captured state.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::types::{File, MediaInfo, SearchResult};

/// Transform over the live DOM.
pub type SyncTransform<T, C> = fn(&Matched<'_>, &C) -> anyhow::Result<T>;

/// Transform that may fetch more pages before producing its value.
pub type AsyncTransform<T, C> = fn(Node, Arc<C>) -> BoxFuture<'static, anyhow::Result<T>>;

/// What a field's selector matched inside its scope.
pub struct Matched<'a> {
    /// First match in document order.
    pub node: ElementRef<'a>,
    /// Every match, in document order.
    pub all: Vec<ElementRef<'a>>,
    /// Which entry of the field's selector list `node` satisfies.
    pub selector_index: usize,
}

impl<'a> Matched<'a> {
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.node.value().attr(name)
    }

    pub fn text(&self) -> String {
        text_of(self.node)
    }

    /// Trimmed text of the first descendant matching `css`.
    pub fn find_text(&self, css: &str) -> String {
        Selector::parse(css)
            .ok()
            .and_then(|sel| self.node.select(&sel).next())
            .map(text_of)
            .unwrap_or_default()
    }
}

/// Trimmed concatenated text content.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Owned copy of a matched element.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub html: String,
    pub selector_index: usize,
}

impl Node {
    pub fn from_element(el: ElementRef<'_>, selector_index: usize) -> Self {
        Self {
            name: el.value().name().to_string(),
            attrs: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: text_of(el),
            html: el.html(),
            selector_index,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

pub enum Transform<T, C> {
    Sync(SyncTransform<T, C>),
    Async(AsyncTransform<T, C>),
}

/// One field of a record: where to look and how to turn the match into `T`.
pub struct Field<T, C> {
    selectors: Vec<&'static str>,
    group: Option<Selector>,
    parts: Vec<Selector>,
    transform: Transform<T, C>,
}

impl<C> Field<String, C> {
    /// Trimmed text of the first match of `css`.
    pub fn text(css: &'static str) -> Self {
        Self::new(&[css], Transform::Sync(|m, _| Ok(m.text())))
    }
}

impl<T, C> Field<T, C> {
    /// `selectors` empty means the scope element itself; several entries are
    /// alternative layouts, first match in document order wins.
    pub fn new(selectors: &[&'static str], transform: Transform<T, C>) -> Self {
        let parts: Vec<Selector> = selectors
            .iter()
            .filter_map(|css| Selector::parse(css).ok())
            .collect();
        let group = if selectors.is_empty() || parts.len() != selectors.len() {
            None
        } else {
            Selector::parse(&selectors.join(", ")).ok()
        };
        Self {
            selectors: selectors.to_vec(),
            group,
            parts,
            transform,
        }
    }

    pub fn sync(selectors: &[&'static str], f: SyncTransform<T, C>) -> Self {
        Self::new(selectors, Transform::Sync(f))
    }

    pub fn deferred(selectors: &[&'static str], f: AsyncTransform<T, C>) -> Self {
        Self::new(selectors, Transform::Async(f))
    }

    /// `false` if any selector failed to parse.
    pub fn is_valid(&self) -> bool {
        self.selectors.is_empty() || self.group.is_some()
    }

    fn select<'a>(&self, scope: ElementRef<'a>) -> Option<Matched<'a>> {
        if self.selectors.is_empty() {
            return Some(Matched {
                node: scope,
                all: vec![scope],
                selector_index: 0,
            });
        }
        let group = self.group.as_ref()?;
        let all: Vec<ElementRef<'a>> = scope.select(group).collect();
        let node = *all.first()?;
        let selector_index = self
            .parts
            .iter()
            .position(|sel| sel.matches(&node))
            .unwrap_or(0);
        Some(Matched {
            node,
            all,
            selector_index,
        })
    }
}

impl<T, C> Field<T, C>
where
    T: Default + Send + 'static,
    C: Send + Sync + 'static,
{
    /// Evaluate against `scope`. Sync transforms finish here; async ones
    /// come back pending.
    pub fn extract(&self, field: &'static str, scope: ElementRef<'_>, ctx: &Arc<C>) -> Extracted<T> {
        let Some(matched) = self.select(scope) else {
            debug!(field, selectors = ?self.selectors, "No match");
            return Extracted::Ready(T::default());
        };

        match &self.transform {
            Transform::Sync(f) => match f(&matched, ctx) {
                Ok(value) => Extracted::Ready(value),
                Err(e) => {
                    warn!(field, "Transform failed: {e:#}");
                    Extracted::Ready(T::default())
                }
            },
            Transform::Async(f) => Extracted::Pending {
                field,
                future: f(
                    Node::from_element(matched.node, matched.selector_index),
                    Arc::clone(ctx),
                ),
            },
        }
    }
}

/// A field value, possibly still waiting on a secondary fetch.
pub enum Extracted<T> {
    Ready(T),
    Pending {
        field: &'static str,
        future: BoxFuture<'static, anyhow::Result<T>>,
    },
}

impl<T: Default> Extracted<T> {
    /// Await the value; a failed async transform yields the default.
    pub async fn resolve(self) -> T {
        match self {
            Self::Ready(value) => value,
            Self::Pending { field, future } => match future.await {
                Ok(value) => value,
                Err(e) => {
                    warn!(field, "Async transform failed: {e:#}");
                    T::default()
                }
            },
        }
    }
}

/// Field set for one search hit, evaluated per scope match.
pub struct SearchSpec<C> {
    pub scope: &'static str,
    pub id: Field<String, C>,
    pub name: Field<String, C>,
    pub image: Field<String, C>,
}

impl<C: Send + Sync + 'static> SearchSpec<C> {
    pub fn is_valid(&self) -> bool {
        Selector::parse(self.scope).is_ok()
            && self.id.is_valid()
            && self.name.is_valid()
            && self.image.is_valid()
    }

    /// Every scope match becomes one result, in document order. No
    /// matches is an empty list.
    pub async fn extract(&self, html: &str, provider: &str, ctx: &Arc<C>) -> Vec<SearchResult> {
        let pending: Vec<_> = {
            let Ok(scope) = Selector::parse(self.scope) else {
                warn!(scope = self.scope, "Invalid search scope selector");
                return Vec::new();
            };
            let document = Html::parse_document(html);
            document
                .select(&scope)
                .map(|el| {
                    (
                        self.id.extract("id", el, ctx),
                        self.name.extract("name", el, ctx),
                        self.image.extract("image", el, ctx),
                    )
                })
                .collect()
        };

        join_all(pending.into_iter().map(|(id, name, image)| async move {
            let (id, name, image) = futures::join!(id.resolve(), name.resolve(), image.resolve());
            SearchResult {
                id,
                name,
                image,
                provider: provider.to_string(),
            }
        }))
        .await
    }
}

/// Field set for an info page, evaluated inside the first scope match.
pub struct InfoSpec<C> {
    pub scope: &'static str,
    pub title: Field<String, C>,
    pub image: Field<String, C>,
    pub trailer: Field<Option<String>, C>,
    pub files: Field<Vec<File>, C>,
}

impl<C: Send + Sync + 'static> InfoSpec<C> {
    pub fn is_valid(&self) -> bool {
        Selector::parse(self.scope).is_ok()
            && self.title.is_valid()
            && self.image.is_valid()
            && self.trailer.is_valid()
            && self.files.is_valid()
    }

    /// `None` when the scope itself is missing. Secondary fetches run
    /// concurrently and each degrades on its own.
    pub async fn extract(&self, html: &str, ctx: &Arc<C>) -> Option<MediaInfo> {
        let (title, image, trailer, files) = {
            let scope = Selector::parse(self.scope).ok()?;
            let document = Html::parse_document(html);
            let root = document.select(&scope).next()?;
            (
                self.title.extract("title", root, ctx),
                self.image.extract("image", root, ctx),
                self.trailer.extract("trailer", root, ctx),
                self.files.extract("files", root, ctx),
            )
        };

        let (title, image, trailer, files) =
            futures::join!(title.resolve(), image.resolve(), trailer.resolve(), files.resolve());

        Some(MediaInfo {
            title,
            image,
            trailer,
            files,
        })
    }
}
