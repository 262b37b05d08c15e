/// Search backend abstraction
///
/// The controller only needs to send a query snapshot for a given page and get back either
/// a result page or a typed failure. Ranking, indexing and highlighting all live behind this
/// trait, so the hosted service can be swapped without touching the controller.
use crate::{
    error::SearchError,
    models::{Query, ResultPage},
};

pub mod algolia;

pub use algolia::AlgoliaProvider;

/// Trait for hosted search services
///
/// An empty result set is `Ok` with no items; failures are always `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch one page of hits for a query snapshot
    ///
    /// The returned page echoes the query it answers.
    async fn search(&self, query: &Query, page: u32) -> Result<ResultPage, SearchError>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;
}
