/// Algolia search provider
///
/// Talks to the REST query endpoint directly:
/// `POST {host}/1/indexes/{index}/query` with the search parameters as a JSON body,
/// authenticated by application ID and search-only API key headers.
use reqwest::{Client as HttpClient, StatusCode};

use crate::{
    config::Config,
    error::SearchError,
    models::{AlgoliaErrorBody, AlgoliaQueryBody, AlgoliaSearchResponse, Query, ResultPage},
    services::providers::SearchBackend,
};

const APPLICATION_ID_HEADER: &str = "X-Algolia-Application-Id";
const API_KEY_HEADER: &str = "X-Algolia-API-Key";

#[derive(Clone)]
pub struct AlgoliaProvider {
    http_client: HttpClient,
    app_id: String,
    api_key: String,
    index: String,
    base_url: String,
}

impl AlgoliaProvider {
    pub fn new(app_id: String, api_key: String, index: String, base_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            app_id,
            api_key,
            index,
            base_url,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.algolia_app_id.clone(),
            config.algolia_api_key.clone(),
            config.algolia_index.clone(),
            config.algolia_base_url(),
        )
    }

    fn query_url(&self) -> String {
        format!(
            "{}/1/indexes/{}/query",
            self.base_url.trim_end_matches('/'),
            self.index
        )
    }

    /// Maps a non-2xx response to a backend error, preferring Algolia's own message
    fn backend_error(status: StatusCode, body: &str) -> SearchError {
        let message = serde_json::from_str::<AlgoliaErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| body.to_string());

        SearchError::Backend {
            code: status.as_u16(),
            message,
        }
    }
}

#[async_trait::async_trait]
impl SearchBackend for AlgoliaProvider {
    async fn search(&self, query: &Query, page: u32) -> Result<ResultPage, SearchError> {
        let response = self
            .http_client
            .post(self.query_url())
            .header(APPLICATION_ID_HEADER, &self.app_id)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&AlgoliaQueryBody::new(query, page))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::backend_error(status, &body));
        }

        let raw: AlgoliaSearchResponse = response.json().await?;

        tracing::info!(
            query = %query.text,
            page = page,
            hits = raw.hits.len(),
            total_hits = raw.nb_hits,
            processing_ms = raw.processing_time_ms,
            provider = "algolia",
            "Search completed"
        );

        Ok(raw.into_result_page(query.clone()))
    }

    fn name(&self) -> &'static str {
        "algolia"
    }
}
