use serde::Deserialize;

use crate::models::EmptyQueryPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Algolia application ID
    pub algolia_app_id: String,

    /// Algolia search-only API key
    pub algolia_api_key: String,

    /// Name of the movies index
    #[serde(default = "default_algolia_index")]
    pub algolia_index: String,

    /// Overrides the `{app_id}-dsn.algolia.net` host (useful for proxies and tests)
    #[serde(default)]
    pub algolia_url: Option<String>,

    /// Hits requested per page
    #[serde(default = "default_hits_per_page")]
    pub hits_per_page: u32,

    /// Attributes returned for every hit
    #[serde(default = "default_attributes_to_retrieve")]
    pub attributes_to_retrieve: Vec<String>,

    /// Attributes the backend highlights
    #[serde(default = "default_attributes_to_highlight")]
    pub attributes_to_highlight: Vec<String>,

    /// Rows from the end of the list that trigger the next page
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,

    /// Delay before a query edit is sent (0 disables debouncing)
    #[serde(default)]
    pub debounce_ms: u64,

    /// What an empty search bar shows
    #[serde(default)]
    pub empty_query_policy: EmptyQueryPolicy,

    /// Buffered controller events per subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Open sessions kept before the oldest is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_algolia_index() -> String {
    "movies".to_string()
}

fn default_hits_per_page() -> u32 {
    15
}

fn default_attributes_to_retrieve() -> Vec<String> {
    ["title", "image", "rating", "year"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_attributes_to_highlight() -> Vec<String> {
    vec!["title".to_string()]
}

fn default_lookahead() -> usize {
    5
}

fn default_event_capacity() -> usize {
    64
}

fn default_max_sessions() -> usize {
    1024
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Base URL of the search backend
    pub fn algolia_base_url(&self) -> String {
        self.algolia_url
            .clone()
            .unwrap_or_else(|| format!("https://{}-dsn.algolia.net", self.algolia_app_id))
    }
}
