//! Round-robin paging over several providers' result lists.
//!
//! Round `k` takes `[k*size, (k+1)*size)` from every provider list in
//! order; page `n` is rounds `0..n` concatenated. Every provider shows up
//! on the first page instead of one provider filling it alone.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SearchResult;

/// One page of the merged feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub results: Vec<SearchResult>,
    pub has_more: bool,
}

/// Rounds `0..page_number` of `provider_results`. Page 0 is empty.
pub fn page(provider_results: &[Vec<SearchResult>], page_number: usize, page_size: usize) -> Page {
    let total: usize = provider_results.iter().map(Vec::len).sum();
    let longest = provider_results.iter().map(Vec::len).max().unwrap_or(0);
    let mut results = Vec::new();

    if page_size > 0 {
        for round in 0..page_number {
            let start = round.saturating_mul(page_size);
            if start >= longest {
                break;
            }
            let end = start.saturating_add(page_size);
            for list in provider_results {
                if start < list.len() {
                    results.extend_from_slice(&list[start..end.min(list.len())]);
                }
            }
        }
    }

    Page {
        has_more: results.len() < total,
        results,
    }
}

/// Number of rounds needed to emit everything.
pub fn page_count(provider_results: &[Vec<SearchResult>], page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    let longest = provider_results.iter().map(Vec::len).max().unwrap_or(0);
    longest.div_ceil(page_size)
}

/// Results of one query, kept between "show more" requests so paging never
/// re-queries providers. Owned by the caller; serializable for an external
/// key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSession {
    pub id: Uuid,
    pub query: String,
    pub provider_results: Vec<Vec<SearchResult>>,
    pub page: usize,
}

impl SearchSession {
    /// New session positioned on the first page.
    pub fn new(query: impl Into<String>, provider_results: Vec<Vec<SearchResult>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            provider_results,
            page: 1,
        }
    }

    pub fn total(&self) -> usize {
        self.provider_results.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn current(&self, page_size: usize) -> Page {
        page(&self.provider_results, self.page, page_size)
    }

    /// Advance one page. `None`, with the page left unchanged, once
    /// everything has been shown.
    pub fn show_more(&mut self, page_size: usize) -> Option<Page> {
        if self.page >= page_count(&self.provider_results, page_size) {
            return None;
        }
        self.page += 1;
        Some(self.current(page_size))
    }
}
