use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod highlight;
pub mod query;
pub mod record;

pub use query::{EmptyQueryPolicy, Query};
pub use record::Record;

/// Identifier the controller assigns to each backend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchRequestId(pub u64);

impl Display for SearchRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a backend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    /// Nothing outstanding
    Idle,
    /// Awaiting a response that will be merged if it arrives in time
    InFlight { request_id: SearchRequestId, page: u32 },
    /// Still awaiting a response, but a newer query has superseded it
    Cancelled,
}

/// Accumulated results for one query, possibly spanning several fetched pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultPage {
    pub items: Vec<Record>,
    pub total_hits: u64,
    /// Last page merged into `items`
    pub page: u32,
    /// Number of pages the backend is willing to serve, when it says so
    pub page_count: Option<u32>,
    /// Query snapshot that produced these results
    pub query: Query,
}

impl ResultPage {
    /// A page with no hits, used when the list is cleared locally
    pub fn empty(query: Query) -> Self {
        Self {
            items: Vec::new(),
            total_hits: 0,
            page: 0,
            page_count: Some(0),
            query,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether another page can still be fetched
    pub fn has_more(&self) -> bool {
        let below_total = (self.items.len() as u64) < self.total_hits;
        let below_page_count = self.page_count.map_or(true, |count| self.page + 1 < count);
        below_total && below_page_count
    }

    /// Appends the next page in order
    ///
    /// An empty continuation pins `total_hits` to what has been loaded: the backend
    /// has nothing more to give even if it advertised a larger total.
    pub fn append(&mut self, next: ResultPage) {
        if next.items.is_empty() {
            self.total_hits = self.items.len() as u64;
        } else {
            self.total_hits = next.total_hits;
            self.items.extend(next.items);
        }
        self.page = next.page;
        self.page_count = next.page_count;
    }
}

// ============================================================================
// Algolia REST API Types
// ============================================================================

/// Body of `POST /1/indexes/{index}/query`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlgoliaQueryBody {
    pub query: String,
    pub hits_per_page: u32,
    pub page: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_retrieve: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_highlight: Vec<String>,
}

impl AlgoliaQueryBody {
    pub fn new(query: &Query, page: u32) -> Self {
        Self {
            query: query.text.clone(),
            hits_per_page: query.page_size,
            page,
            attributes_to_retrieve: query.attributes_to_retrieve.iter().cloned().collect(),
            attributes_to_highlight: query.attributes_to_highlight.iter().cloned().collect(),
        }
    }
}

/// Raw search response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoliaSearchResponse {
    #[serde(default)]
    pub hits: Vec<Record>,
    #[serde(default)]
    pub nb_hits: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub nb_pages: Option<u32>,
    #[serde(default, rename = "processingTimeMS")]
    pub processing_time_ms: Option<u64>,
}

impl AlgoliaSearchResponse {
    /// Converts to a result page echoing the query that produced it
    pub fn into_result_page(self, query: Query) -> ResultPage {
        ResultPage {
            items: self.hits,
            total_hits: self.nb_hits,
            page: self.page,
            page_count: self.nb_pages,
            query,
        }
    }
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct AlgoliaErrorBody {
    pub message: String,
}
