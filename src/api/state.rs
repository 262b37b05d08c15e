use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    config::Config,
    models::Query,
    services::{
        images::{HttpImageLoader, ImageLoader},
        providers::{AlgoliaProvider, SearchBackend},
        ControllerSettings, IncrementalSearchController,
    },
};

const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<RwLock<AppStateInner>>,
    pub backend: Arc<dyn SearchBackend>,
    pub image_loader: Arc<dyn ImageLoader>,
    /// Template every new session starts from
    pub query: Query,
    pub settings: ControllerSettings,
    /// Cap on open sessions; the oldest is evicted to make room
    pub max_sessions: usize,
}

/// Inner state that can be modified
pub struct AppStateInner {
    pub sessions: HashMap<Uuid, Session>,
}

/// One search screen: a controller plus bookkeeping
#[derive(Clone)]
pub struct Session {
    pub controller: IncrementalSearchController,
    pub created_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        image_loader: Arc<dyn ImageLoader>,
        query: Query,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppStateInner {
                sessions: HashMap::new(),
            })),
            backend,
            image_loader,
            query,
            settings,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Wires the Algolia backend and HTTP image loader from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(AlgoliaProvider::from_config(config)),
            Arc::new(HttpImageLoader::new()),
            Query::new(config.hits_per_page)
                .retrieve(config.attributes_to_retrieve.iter().cloned())
                .highlight(config.attributes_to_highlight.iter().cloned()),
            ControllerSettings::from(config),
        )
        .with_max_sessions(config.max_sessions)
    }

    /// Creates a session and runs its first load
    pub async fn open_session(&self) -> (Uuid, Session) {
        let controller = IncrementalSearchController::new(
            self.backend.clone(),
            self.query.clone(),
            self.settings.clone(),
        );
        controller.search();

        let session = Session {
            controller,
            created_at: Utc::now(),
        };
        let id = Uuid::new_v4();

        let mut inner = self.inner.write().await;
        while inner.sessions.len() >= self.max_sessions {
            let Some(oldest) = inner
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.created_at)
                .map(|(id, _)| *id)
            else {
                break;
            };
            if let Some(evicted) = inner.sessions.remove(&oldest) {
                evicted.controller.close();
                tracing::info!(session = %oldest, "Evicted oldest search session");
            }
        }
        inner.sessions.insert(id, session.clone());
        (id, session)
    }

    pub async fn session(&self, id: &Uuid) -> Option<Session> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    /// Removes a session, discarding its results
    pub async fn close_session(&self, id: &Uuid) -> bool {
        match self.inner.write().await.sessions.remove(id) {
            Some(session) => {
                session.controller.close();
                true
            }
            None => false,
        }
    }
}
