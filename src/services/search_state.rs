/// Synchronous bookkeeping behind the search controller
///
/// Every decision about which request to issue and which response to keep is made here,
/// under the controller's single lock, so ordering holds no matter how completions interleave.
/// Each request is tagged with the generation current at issue time; a response is merged
/// only if that generation is still current when it arrives.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    error::SearchError,
    models::{EmptyQueryPolicy, Query, RequestState, ResultPage, SearchRequestId},
};

/// A request the controller must send to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub request_id: SearchRequestId,
    pub generation: u64,
    pub page: u32,
    pub query: Query,
}

/// Notifications for renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// A new top-level result set replaced the previous one
    ResultsReplaced {
        generation: u64,
        count: usize,
        total_hits: u64,
    },
    /// A further page was appended
    ResultsExtended {
        generation: u64,
        page: u32,
        appended: usize,
        count: usize,
    },
    /// A request for the current query failed; results are unchanged
    RequestFailed {
        generation: u64,
        page: u32,
        error: SearchError,
    },
    /// Pending request count moved between zero and non-zero
    BusyChanged { busy: bool },
}

/// How a completed request was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Replaced,
    Extended { appended: usize },
    Failed(SearchError),
    /// Superseded or out of sequence; dropped without a trace for the caller
    Stale,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    generation: u64,
    page: u32,
}

#[derive(Debug)]
pub struct SearchState {
    query: Query,
    generation: u64,
    next_request_id: u64,
    in_flight: BTreeMap<SearchRequestId, InFlight>,
    results: Option<ResultPage>,
    results_generation: u64,
    last_error: Option<SearchError>,
    latest_request: Option<SearchRequestId>,
    empty_query_policy: EmptyQueryPolicy,
}

impl SearchState {
    pub fn new(query: Query, empty_query_policy: EmptyQueryPolicy) -> Self {
        Self {
            query,
            generation: 0,
            next_request_id: 0,
            in_flight: BTreeMap::new(),
            results: None,
            results_generation: 0,
            last_error: None,
            latest_request: None,
            empty_query_policy,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn results(&self) -> Option<&ResultPage> {
        self.results.as_ref()
    }

    pub fn last_error(&self) -> Option<&SearchError> {
        self.last_error.as_ref()
    }

    pub fn pending_request_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Updates the query text and starts a new generation
    ///
    /// Everything still in flight from earlier generations becomes stale.
    pub fn set_query_text(&mut self, text: String) -> u64 {
        self.query.text = text;
        self.advance_generation()
    }

    /// Starts a new generation and drops the loaded results
    pub fn reset(&mut self) -> u64 {
        self.results = None;
        self.advance_generation()
    }

    fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.last_error = None;
        self.generation
    }

    /// Registers a top-level search for the current generation
    ///
    /// Returns `None` when the empty-query policy clears the list locally instead.
    pub fn begin_search(&mut self, events: &mut Vec<ControllerEvent>) -> Option<Ticket> {
        if self.query.is_empty() && self.empty_query_policy == EmptyQueryPolicy::ShowNothing {
            self.results = Some(ResultPage::empty(self.query.clone()));
            self.results_generation = self.generation;
            events.push(ControllerEvent::ResultsReplaced {
                generation: self.generation,
                count: 0,
                total_hits: 0,
            });
            return None;
        }

        Some(self.register(0, self.query.clone(), events))
    }

    /// Registers the next page for the loaded results, if one is warranted
    pub fn begin_load_more(&mut self, events: &mut Vec<ControllerEvent>) -> Option<Ticket> {
        let results = self.results.as_ref()?;

        if self.results_generation != self.generation {
            return None;
        }
        if self
            .in_flight
            .values()
            .any(|req| req.generation == self.generation)
        {
            return None;
        }
        if !results.has_more() {
            return None;
        }

        let page = results.page + 1;
        let query = results.query.clone();
        Some(self.register(page, query, events))
    }

    fn register(&mut self, page: u32, query: Query, events: &mut Vec<ControllerEvent>) -> Ticket {
        self.next_request_id += 1;
        let request_id = SearchRequestId(self.next_request_id);

        if self.in_flight.is_empty() {
            events.push(ControllerEvent::BusyChanged { busy: true });
        }
        self.in_flight.insert(
            request_id,
            InFlight {
                generation: self.generation,
                page,
            },
        );
        self.latest_request = Some(request_id);

        Ticket {
            request_id,
            generation: self.generation,
            page,
            query,
        }
    }

    /// Applies a backend outcome for a previously issued ticket
    pub fn complete(
        &mut self,
        ticket: &Ticket,
        outcome: Result<ResultPage, SearchError>,
        events: &mut Vec<ControllerEvent>,
    ) -> Completion {
        if self.in_flight.remove(&ticket.request_id).is_none() {
            // Completed twice, or never issued by this state
            return Completion::Stale;
        }

        let completion = if ticket.generation != self.generation {
            Completion::Stale
        } else {
            match outcome {
                Ok(page) => self.merge(ticket, page, events),
                Err(error) => {
                    self.last_error = Some(error.clone());
                    events.push(ControllerEvent::RequestFailed {
                        generation: ticket.generation,
                        page: ticket.page,
                        error: error.clone(),
                    });
                    Completion::Failed(error)
                }
            }
        };

        if self.in_flight.is_empty() {
            events.push(ControllerEvent::BusyChanged { busy: false });
        }

        completion
    }

    fn merge(
        &mut self,
        ticket: &Ticket,
        mut page: ResultPage,
        events: &mut Vec<ControllerEvent>,
    ) -> Completion {
        // The echo must describe the request we sent, whatever the backend reports
        page.query = ticket.query.clone();
        page.page = ticket.page;

        if ticket.page == 0 {
            let count = page.len();
            let total_hits = page.total_hits;
            self.results = Some(page);
            self.results_generation = ticket.generation;
            self.last_error = None;
            events.push(ControllerEvent::ResultsReplaced {
                generation: ticket.generation,
                count,
                total_hits,
            });
            return Completion::Replaced;
        }

        match self.results.as_mut() {
            Some(results)
                if self.results_generation == ticket.generation
                    && results.page + 1 == ticket.page =>
            {
                let appended = page.len();
                results.append(page);
                self.last_error = None;
                events.push(ControllerEvent::ResultsExtended {
                    generation: ticket.generation,
                    page: ticket.page,
                    appended,
                    count: results.len(),
                });
                Completion::Extended { appended }
            }
            _ => Completion::Stale,
        }
    }

    /// State of the most recently issued request
    pub fn latest_request_state(&self) -> RequestState {
        match self.latest_request {
            Some(id) => self.request_state(id),
            None => RequestState::Idle,
        }
    }

    pub fn request_state(&self, request_id: SearchRequestId) -> RequestState {
        match self.in_flight.get(&request_id) {
            Some(req) if req.generation == self.generation => RequestState::InFlight {
                request_id,
                page: req.page,
            },
            Some(_) => RequestState::Cancelled,
            None => RequestState::Idle,
        }
    }
}
