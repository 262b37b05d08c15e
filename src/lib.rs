//! Incremental, paginated movie search over a hosted search index.
//!
//! [`services::IncrementalSearchController`] is the core: it turns search-bar edits into
//! generation-tagged backend requests, discards responses for superseded queries, and
//! accumulates pages for a list renderer. The [`api`] module exposes it over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod services;
