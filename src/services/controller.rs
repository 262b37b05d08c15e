use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    config::Config,
    error::SearchError,
    models::{EmptyQueryPolicy, Query, Record, RequestState, ResultPage},
    services::{
        providers::SearchBackend,
        search_state::{Completion, ControllerEvent, SearchState, Ticket},
    },
};

/// Tunables for a controller instance
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub lookahead: usize,
    pub debounce: Duration,
    pub empty_query_policy: EmptyQueryPolicy,
    pub event_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            lookahead: 5,
            debounce: Duration::ZERO,
            empty_query_policy: EmptyQueryPolicy::FetchDefault,
            event_capacity: 64,
        }
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            lookahead: config.lookahead,
            debounce: Duration::from_millis(config.debounce_ms),
            empty_query_policy: config.empty_query_policy,
            event_capacity: config.event_capacity.max(1),
        }
    }
}

/// Read model handed to renderers
#[derive(Debug, Clone, Serialize)]
pub struct SearchSnapshot {
    pub generation: u64,
    pub query: String,
    pub items: Vec<Record>,
    pub total_hits: u64,
    pub page: Option<u32>,
    pub has_more: bool,
    pub busy: bool,
    pub pending_requests: usize,
    pub request: RequestState,
    pub last_error: Option<SearchError>,
}

/// Incremental, cancelable, paginated search over a remote backend
///
/// Cloning yields another handle to the same controller. Operations return immediately;
/// backend calls run as Tokio tasks, so they must be invoked from within a runtime.
/// Results are observed through [`subscribe`](Self::subscribe) or [`snapshot`](Self::snapshot).
#[derive(Clone)]
pub struct IncrementalSearchController {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<SearchState>,
    backend: Arc<dyn SearchBackend>,
    events: broadcast::Sender<ControllerEvent>,
    settings: ControllerSettings,
}

impl IncrementalSearchController {
    pub fn new(backend: Arc<dyn SearchBackend>, query: Query, settings: ControllerSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SearchState::new(query, settings.empty_query_policy)),
                backend,
                events,
                settings,
            }),
        }
    }

    /// Receives every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.events.subscribe()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.inner.settings
    }

    /// Replaces the query text and starts a fresh search for it
    pub fn set_query_text(&self, text: impl Into<String>) {
        let text = text.into();
        let generation = self.lock().set_query_text(text);

        tracing::debug!(
            generation,
            backend = self.inner.backend.name(),
            "Query text updated"
        );

        if self.inner.settings.debounce.is_zero() {
            self.search();
            return;
        }

        let controller = self.clone();
        let delay = self.inner.settings.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            controller.search_if_current(generation);
        });
    }

    /// Sends the current query for page 0, tagged with the current generation
    pub fn search(&self) {
        let ticket = {
            let mut state = self.lock();
            let mut events = Vec::new();
            let ticket = state.begin_search(&mut events);
            self.publish(events);
            ticket
        };

        if let Some(ticket) = ticket {
            self.dispatch(ticket);
        }
    }

    fn search_if_current(&self, generation: u64) {
        let ticket = {
            let mut state = self.lock();
            if state.generation() != generation {
                tracing::trace!(generation, "Debounced query superseded");
                return;
            }
            let mut events = Vec::new();
            let ticket = state.begin_search(&mut events);
            self.publish(events);
            ticket
        };

        if let Some(ticket) = ticket {
            self.dispatch(ticket);
        }
    }

    /// Requests the next page of the loaded results
    ///
    /// Returns `false` without contacting the backend when nothing is loaded, a request
    /// for the current query is still pending, or every hit is already loaded.
    pub fn load_more(&self) -> bool {
        let ticket = {
            let mut state = self.lock();
            let mut events = Vec::new();
            let ticket = state.begin_load_more(&mut events);
            self.publish(events);
            ticket
        };

        match ticket {
            Some(ticket) => {
                self.dispatch(ticket);
                true
            }
            None => false,
        }
    }

    /// Whether rendering `row` should prefetch the next page
    pub fn should_load_more(&self, row: usize) -> bool {
        row.saturating_add(self.inner.settings.lookahead) >= self.len()
    }

    /// Pagination trigger for renderers: call whenever a row is about to be shown
    pub fn row_appeared(&self, row: usize) -> bool {
        self.should_load_more(row) && self.load_more()
    }

    pub fn pending_request_count(&self) -> usize {
        self.lock().pending_request_count()
    }

    pub fn is_busy(&self) -> bool {
        self.pending_request_count() > 0
    }

    /// Number of loaded items
    pub fn len(&self) -> usize {
        self.lock().results().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn item(&self, index: usize) -> Option<Record> {
        self.lock()
            .results()
            .and_then(|r| r.items.get(index).cloned())
    }

    pub fn query(&self) -> Query {
        self.lock().query().clone()
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        let state = self.lock();
        let results = state.results();

        SearchSnapshot {
            generation: state.generation(),
            query: state.query().text.clone(),
            items: results.map(|r| r.items.clone()).unwrap_or_default(),
            total_hits: results.map_or(0, |r| r.total_hits),
            page: results.map(|r| r.page),
            has_more: results.is_some_and(|r| r.has_more()),
            busy: state.pending_request_count() > 0,
            pending_requests: state.pending_request_count(),
            request: state.latest_request_state(),
            last_error: state.last_error().cloned(),
        }
    }

    /// Drops loaded results and makes every outstanding response stale
    pub fn close(&self) {
        let generation = self.lock().reset();
        tracing::debug!(generation, "Search controller closed");
    }

    fn dispatch(&self, ticket: Ticket) {
        let controller = self.clone();
        let backend = self.inner.backend.clone();
        let query = ticket.query.clone();
        let page = ticket.page;

        tokio::spawn(async move {
            // The backend call runs in its own task so a panic still completes the ticket
            let task = tokio::spawn(async move { backend.search(&query, page).await });
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Search task join error");
                    Err(SearchError::Backend {
                        code: 500,
                        message: format!("Search task failed: {}", e),
                    })
                }
            };
            controller.finish(ticket, outcome);
        });
    }

    fn finish(&self, ticket: Ticket, outcome: Result<ResultPage, SearchError>) {
        let mut state = self.lock();
        let mut events = Vec::new();
        let completion = state.complete(&ticket, outcome, &mut events);

        match &completion {
            Completion::Replaced | Completion::Extended { .. } => tracing::info!(
                request_id = %ticket.request_id,
                generation = ticket.generation,
                page = ticket.page,
                query = %ticket.query.text,
                loaded = state.results().map_or(0, |r| r.len()),
                "Search results merged"
            ),
            Completion::Failed(error) => tracing::warn!(
                request_id = %ticket.request_id,
                generation = ticket.generation,
                page = ticket.page,
                error = %error,
                "Search request failed"
            ),
            Completion::Stale => tracing::debug!(
                request_id = %ticket.request_id,
                generation = ticket.generation,
                current = state.generation(),
                "Discarded stale response"
            ),
        }

        // Published under the lock so subscribers see events in state order
        self.publish(events);
    }

    fn publish(&self, events: Vec<ControllerEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.inner.events.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SearchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{MockSearchBackend, SearchBackend};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::{mpsc, oneshot};

    type Reply = oneshot::Sender<Result<ResultPage, SearchError>>;

    /// Backend that parks every request until the test answers it
    struct ScriptedBackend {
        calls: mpsc::UnboundedSender<(String, u32, Reply)>,
    }

    #[async_trait::async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, query: &Query, page: u32) -> Result<ResultPage, SearchError> {
            let (tx, rx) = oneshot::channel();
            let _ = self.calls.send((query.text.clone(), page, tx));
            rx.await.unwrap_or_else(|_| {
                Err(SearchError::Network {
                    message: "dropped".to_string(),
                })
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn scripted(
        settings: ControllerSettings,
    ) -> (
        IncrementalSearchController,
        mpsc::UnboundedReceiver<(String, u32, Reply)>,
    ) {
        let (calls, rx) = mpsc::unbounded_channel();
        let controller = IncrementalSearchController::new(
            Arc::new(ScriptedBackend { calls }),
            Query::default(),
            settings,
        );
        (controller, rx)
    }

    fn page(titles: &[&str], total_hits: u64, page: u32) -> ResultPage {
        ResultPage {
            items: titles
                .iter()
                .map(|t| Record::from(json!({ "title": t })))
                .collect(),
            total_hits,
            page,
            page_count: None,
            query: Query::default(),
        }
    }

    fn titles(controller: &IncrementalSearchController) -> Vec<String> {
        controller
            .snapshot()
            .items
            .iter()
            .filter_map(|i| i.title().map(str::to_string))
            .collect()
    }

    async fn next_event(events: &mut broadcast::Receiver<ControllerEvent>) -> ControllerEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Collects events up to and including the next idle transition
    async fn until_idle(events: &mut broadcast::Receiver<ControllerEvent>) -> Vec<ControllerEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(events).await;
            let idle = event == ControllerEvent::BusyChanged { busy: false };
            seen.push(event);
            if idle {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_out_of_order_responses_keep_latest_query() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("m");
        controller.set_query_text("ma");
        controller.set_query_text("matrix");

        let mut pending = HashMap::new();
        for _ in 0..3 {
            let (text, page_no, reply) = calls.recv().await.unwrap();
            assert_eq!(page_no, 0);
            pending.insert(text, reply);
        }
        assert_eq!(controller.pending_request_count(), 3);

        let _ = pending
            .remove("matrix")
            .unwrap()
            .send(Ok(page(&["The Matrix"], 1, 0)));
        let _ = pending.remove("m").unwrap().send(Ok(page(&["Mad Max"], 1, 0)));
        let _ = pending.remove("ma").unwrap().send(Ok(page(&["Magnolia"], 1, 0)));

        let seen = until_idle(&mut events).await;

        assert_eq!(titles(&controller), vec!["The Matrix"]);
        assert_eq!(controller.pending_request_count(), 0);
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, ControllerEvent::ResultsReplaced { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_busy_transitions_fire_once_per_edge() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("a");
        controller.set_query_text("ab");
        assert!(controller.is_busy());

        let mut replies = Vec::new();
        for _ in 0..2 {
            replies.push(calls.recv().await.unwrap());
        }
        for (_, _, reply) in replies {
            let _ = reply.send(Err(SearchError::Network {
                message: "offline".to_string(),
            }));
        }

        let seen = until_idle(&mut events).await;
        let busy: Vec<&ControllerEvent> = seen
            .iter()
            .filter(|e| matches!(e, ControllerEvent::BusyChanged { .. }))
            .collect();
        assert_eq!(
            busy,
            vec![
                &ControllerEvent::BusyChanged { busy: true },
                &ControllerEvent::BusyChanged { busy: false },
            ]
        );
        assert!(!controller.is_busy());
    }

    #[tokio::test]
    async fn test_matrix_scenario_paginates_on_lookahead() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("matrix");
        let (text, page_no, reply) = calls.recv().await.unwrap();
        assert_eq!((text.as_str(), page_no), ("matrix", 0));
        let _ = reply.send(Ok(page(&["The Matrix", "The Matrix Reloaded"], 3, 0)));
        until_idle(&mut events).await;
        assert_eq!(controller.len(), 2);

        // Row 1 is within five rows of the end
        assert!(controller.should_load_more(1));
        assert!(controller.row_appeared(1));

        let (text, page_no, reply) = calls.recv().await.unwrap();
        assert_eq!((text.as_str(), page_no), ("matrix", 1));
        let _ = reply.send(Ok(page(&["The Matrix Revolutions"], 3, 1)));

        let seen = until_idle(&mut events).await;
        assert!(seen.contains(&ControllerEvent::ResultsExtended {
            generation: 1,
            page: 1,
            appended: 1,
            count: 3,
        }));
        assert_eq!(controller.len(), 3);
        assert_eq!(
            titles(&controller),
            vec![
                "The Matrix",
                "The Matrix Reloaded",
                "The Matrix Revolutions"
            ]
        );

        // Everything is loaded now
        assert!(!controller.row_appeared(2));
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_load_more_does_not_duplicate_pending_request() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("alien");
        assert!(!controller.load_more());

        let (_, _, reply) = calls.recv().await.unwrap();
        let _ = reply.send(Ok(page(&["Alien", "Aliens"], 10, 0)));
        until_idle(&mut events).await;

        assert!(controller.load_more());
        assert!(!controller.load_more());
        assert!(!controller.row_appeared(0));

        let (_, page_no, _reply) = calls.recv().await.unwrap();
        assert_eq!(page_no, 1);
        tokio::task::yield_now().await;
        assert!(calls.try_recv().is_err());
        assert_eq!(controller.pending_request_count(), 1);
    }

    #[tokio::test]
    async fn test_rows_outside_lookahead_do_not_paginate() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.search();
        let (text, _, reply) = calls.recv().await.unwrap();
        assert_eq!(text, "");
        let titles: Vec<String> = (0..15).map(|i| format!("Movie {}", i)).collect();
        let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
        let _ = reply.send(Ok(page(&titles, 100, 0)));
        until_idle(&mut events).await;

        assert!(!controller.row_appeared(3));
        assert!(controller.row_appeared(10));
    }

    #[tokio::test]
    async fn test_lookahead_saturates_at_extreme_rows() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.search();
        let (_, _, reply) = calls.recv().await.unwrap();
        let _ = reply.send(Ok(page(&["Heat", "Ronin"], 10, 0)));
        until_idle(&mut events).await;

        assert!(controller.should_load_more(usize::MAX));
        assert!(controller.row_appeared(usize::MAX));

        let (_, page_no, _reply) = calls.recv().await.unwrap();
        assert_eq!(page_no, 1);
    }

    #[test]
    fn test_huge_lookahead_always_triggers() {
        let mut backend = MockSearchBackend::new();
        backend.expect_search().never();
        backend.expect_name().return_const("mock");

        let controller = IncrementalSearchController::new(
            Arc::new(backend),
            Query::default(),
            ControllerSettings {
                lookahead: usize::MAX,
                ..ControllerSettings::default()
            },
        );

        assert!(controller.should_load_more(0));
        assert!(controller.should_load_more(1));
        assert!(controller.should_load_more(usize::MAX));
    }

    struct PanickingBackend;

    #[async_trait::async_trait]
    impl SearchBackend for PanickingBackend {
        async fn search(&self, _query: &Query, _page: u32) -> Result<ResultPage, SearchError> {
            panic!("index exploded")
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_panicking_backend_completes_request() {
        let controller = IncrementalSearchController::new(
            Arc::new(PanickingBackend),
            Query::default(),
            ControllerSettings::default(),
        );
        let mut events = controller.subscribe();

        controller.set_query_text("heat");
        let seen = until_idle(&mut events).await;

        assert!(seen.iter().any(|e| matches!(
            e,
            ControllerEvent::RequestFailed {
                page: 0,
                error: SearchError::Backend { code: 500, .. },
                ..
            }
        )));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.pending_requests, 0);
        assert!(!snapshot.busy);
        assert!(matches!(
            snapshot.last_error,
            Some(SearchError::Backend { code: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_pagination_response_for_old_query_is_discarded() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("star");
        let (_, _, reply) = calls.recv().await.unwrap();
        let _ = reply.send(Ok(page(&["Star Wars"], 10, 0)));
        until_idle(&mut events).await;

        assert!(controller.load_more());
        let (_, _, old_page) = calls.recv().await.unwrap();

        controller.set_query_text("heat");
        let (_, _, new_search) = calls.recv().await.unwrap();

        let _ = old_page.send(Ok(page(&["Stardust"], 10, 1)));
        let _ = new_search.send(Ok(page(&["Heat"], 1, 0)));
        until_idle(&mut events).await;

        assert_eq!(titles(&controller), vec!["Heat"]);
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_results_kept() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("up");
        let (_, _, reply) = calls.recv().await.unwrap();
        let _ = reply.send(Ok(page(&["Up"], 4, 0)));
        until_idle(&mut events).await;

        assert!(controller.load_more());
        let (_, _, reply) = calls.recv().await.unwrap();
        let error = SearchError::Backend {
            code: 500,
            message: "Internal error".to_string(),
        };
        let _ = reply.send(Err(error.clone()));

        let seen = until_idle(&mut events).await;
        assert!(seen.contains(&ControllerEvent::RequestFailed {
            generation: 1,
            page: 1,
            error: error.clone(),
        }));

        let snapshot = controller.snapshot();
        assert_eq!(titles(&controller), vec!["Up"]);
        assert_eq!(snapshot.last_error, Some(error));
        assert_eq!(snapshot.pending_requests, 0);
        assert!(snapshot.has_more);
        // No automatic retry
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_search_uses_backend_with_query_snapshot() {
        let mut backend = MockSearchBackend::new();
        backend
            .expect_search()
            .withf(|query: &Query, page: &u32| query.text == "heat" && *page == 0)
            .times(1)
            .returning(|query, _| {
                Ok(ResultPage {
                    items: vec![Record::from(json!({ "title": "Heat", "year": 1995 }))],
                    total_hits: 1,
                    page: 0,
                    page_count: Some(1),
                    query: query.clone(),
                })
            });
        backend.expect_name().return_const("mock");

        let controller = IncrementalSearchController::new(
            Arc::new(backend),
            Query::default(),
            ControllerSettings::default(),
        );
        let mut events = controller.subscribe();

        controller.set_query_text("heat");
        until_idle(&mut events).await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.query, "heat");
        assert_eq!(snapshot.total_hits, 1);
        assert_eq!(snapshot.page, Some(0));
        assert!(!snapshot.has_more);
        assert_eq!(snapshot.request, RequestState::Idle);
        assert_eq!(controller.item(0).unwrap().year(), Some(1995));
        assert!(controller.item(1).is_none());
    }

    #[tokio::test]
    async fn test_show_nothing_policy_skips_backend() {
        let mut backend = MockSearchBackend::new();
        backend.expect_search().never();
        backend.expect_name().return_const("mock");

        let controller = IncrementalSearchController::new(
            Arc::new(backend),
            Query::default(),
            ControllerSettings {
                empty_query_policy: EmptyQueryPolicy::ShowNothing,
                ..ControllerSettings::default()
            },
        );
        let mut events = controller.subscribe();

        controller.set_query_text("");
        assert_eq!(
            next_event(&mut events).await,
            ControllerEvent::ResultsReplaced {
                generation: 1,
                count: 0,
                total_hits: 0,
            }
        );
        assert!(controller.is_empty());
        assert!(!controller.is_busy());
        assert!(!controller.load_more());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_sends_only_settled_text() {
        let (controller, mut calls) = scripted(ControllerSettings {
            debounce: Duration::from_millis(300),
            ..ControllerSettings::default()
        });
        let mut events = controller.subscribe();

        controller.set_query_text("m");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_query_text("ma");
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.set_query_text("mat");
        assert_eq!(controller.pending_request_count(), 0);

        let (text, _, reply) = calls.recv().await.unwrap();
        assert_eq!(text, "mat");
        let _ = reply.send(Ok(page(&["The Matrix"], 1, 0)));
        until_idle(&mut events).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(calls.try_recv().is_err());
        assert_eq!(titles(&controller), vec!["The Matrix"]);
    }

    #[tokio::test]
    async fn test_close_discards_results_and_in_flight_responses() {
        let (controller, mut calls) = scripted(ControllerSettings::default());
        let mut events = controller.subscribe();

        controller.set_query_text("jaws");
        let (_, _, reply) = calls.recv().await.unwrap();
        controller.close();

        let _ = reply.send(Ok(page(&["Jaws"], 1, 0)));
        until_idle(&mut events).await;

        assert!(controller.is_empty());
        assert_eq!(controller.snapshot().page, None);
    }
}
