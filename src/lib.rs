//! `kinocrawl` - declarative crawling of movie catalog sites
//!
//! # Features
//!
//! - **Search fan-out**: one query runs against every selected provider
//!   concurrently; a failing provider only drops its own results
//! - **Declarative scraping**: each site is a set of CSS selectors plus
//!   small transforms, including async ones that fetch player pages
//! - **Deferred sources**: files whose urls cost extra requests carry an
//!   `asyncSource` and are resolved only when opened
//! - **Round-robin paging**: every provider shows up on the first page
//! - **Challenge bypass**: anti-bot pages go through an external solver,
//!   with the solved cookie cached per provider
//!
//! # Example
//!
//! ```rust,no_run
//! use kinocrawl::{Crawler, CrawlerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CrawlerConfig::load(None)?;
//!     let crawler = Crawler::from_config(&config)?;
//!     let session = crawler.start_session(&[], "дюна").await;
//!     for result in crawler.page(&session, 1).results {
//!         println!("{} [{}] {}", result.provider, result.id, result.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod bypass;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod http_client;
pub mod paging;
pub mod playerjs;
pub mod providers;
pub mod request;
pub mod resolvers;
pub mod script;
pub mod selector;
pub mod types;

#[cfg(test)]
mod testing;

pub use aggregator::Crawler;
pub use bypass::{BypassLayer, BypassToken, ChallengeSolver, SolverClient};
pub use config::{BypassConfig, BypassMode, CrawlerConfig, ProviderConfig};
pub use error::{CrawlError, Result};
pub use fingerprint::{chrome_profile, firefox_profile, random_profile, BrowserProfile};
pub use http_client::{HttpClient, HttpFetch, Response};
pub use paging::{page, Page, SearchSession};
pub use providers::{CrawlerProvider, MediaProvider, SiteContext, SiteDefinition};
pub use request::{Method, Request, RequestBuilder, SearchShape};
pub use resolvers::{ResolverRegistry, SourceResolver};
pub use types::{AsyncSource, Extractor, File, FileSource, FileUrl, MediaInfo, SearchResult};

/// Version of kinocrawl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
