use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What an empty search bar shows
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueryPolicy {
    /// Send the empty query; the backend answers with its default ordering
    #[default]
    FetchDefault,
    /// Clear the list without contacting the backend
    ShowNothing,
}

/// Search parameters sent with every request
///
/// The controller owns the live query and hands each request its own snapshot,
/// so a request never observes edits made after it was issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub text: String,
    pub page_size: u32,
    pub attributes_to_retrieve: BTreeSet<String>,
    pub attributes_to_highlight: BTreeSet<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new(15)
            .retrieve(["title", "image", "rating", "year"])
            .highlight(["title"])
    }
}

impl Query {
    /// Creates an empty query with the given page size and no attribute restrictions
    pub fn new(page_size: u32) -> Self {
        Self {
            text: String::new(),
            page_size,
            attributes_to_retrieve: BTreeSet::new(),
            attributes_to_highlight: BTreeSet::new(),
        }
    }

    pub fn retrieve<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes_to_retrieve
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn highlight<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes_to_highlight
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// True when the text holds nothing but whitespace
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_matches_movie_list() {
        let query = Query::default();
        assert_eq!(query.page_size, 15);
        assert!(query.text.is_empty());
        assert_eq!(
            query.attributes_to_retrieve.iter().collect::<Vec<_>>(),
            vec!["image", "rating", "title", "year"]
        );
        assert!(query.attributes_to_highlight.contains("title"));
    }

    #[test]
    fn test_attributes_are_deduplicated() {
        let query = Query::new(10).retrieve(["title", "title", "year"]);
        assert_eq!(query.attributes_to_retrieve.len(), 2);
    }

    #[test]
    fn test_whitespace_query_is_empty() {
        let mut query = Query::default();
        query.text = "   ".to_string();
        assert!(query.is_empty());
        query.text = "matrix".to_string();
        assert!(!query.is_empty());
    }

    #[test]
    fn test_empty_query_policy_serialization() {
        let json = serde_json::to_string(&EmptyQueryPolicy::ShowNothing).unwrap();
        assert_eq!(json, "\"show_nothing\"");
        assert_eq!(EmptyQueryPolicy::default(), EmptyQueryPolicy::FetchDefault);
    }
}
