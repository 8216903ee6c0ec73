//! Session controller
//!
//! Drives one search at a time. It serves hits straight from the cache chain,
//! sends misses and load-more rounds to the search worker, feeds the worker's
//! responses through a [`StreamIngestor`] and commits finished lists back to
//! the chain.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheChain;
use crate::config::LoadMoreConfig;
use crate::model::{KeywordSuggestion, SearchKey};
use crate::stream::{
    IngestUpdate, SearchBackend, SearchError, SearchRequest, SearchResponse, StreamIngestor,
    StreamState, WorkerRequest, spawn_worker,
};

/// Caller precondition violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("No active search to continue")]
    NoActiveSearch,

    #[error("A search stream is already in flight")]
    LoadMoreInFlight,

    #[error("Search worker disconnected")]
    WorkerDisconnected,
}

/// Continuation state of the current search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSession {
    /// Server-issued id that continues this search
    pub session_id: Option<String>,
    /// Words sent as `exclude_words` when there is no server session
    pub excluded_words: BTreeSet<String>,
    /// Load-more rounds sent so far
    pub attempts: u32,
}

/// How a search was served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStart {
    /// Served from the cache; no stream was opened
    Cached { count: usize },
    /// A stream was opened
    Streaming { request_id: u64 },
}

pub struct SessionController {
    limits: LoadMoreConfig,
    request_tx: Sender<WorkerRequest>,
    response_rx: Receiver<SearchResponse>,
    request_id: u64,
    in_flight_request_id: Option<u64>,
    current_cancel_token: Option<CancellationToken>,
    key: Option<SearchKey>,
    session: Option<StreamSession>,
    ingestor: StreamIngestor,
    /// The current attempt is a load-more round rather than a first batch
    loading_more: bool,
    can_load_more: bool,
}

impl SessionController {
    pub fn new(
        limits: LoadMoreConfig,
        request_tx: Sender<WorkerRequest>,
        response_rx: Receiver<SearchResponse>,
    ) -> Self {
        Self {
            limits,
            request_tx,
            response_rx,
            request_id: 0,
            in_flight_request_id: None,
            current_cancel_token: None,
            key: None,
            session: None,
            ingestor: StreamIngestor::new(),
            loading_more: false,
            can_load_more: false,
        }
    }

    /// Controller with its own search worker thread
    pub fn spawn<B>(backend: Result<B, SearchError>, limits: LoadMoreConfig) -> Self
    where
        B: SearchBackend + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        spawn_worker(backend, request_rx, response_tx);
        Self::new(limits, request_tx, response_rx)
    }

    /// Start a search, from the cache when possible
    ///
    /// Any stream in flight is cancelled first. Repeating the search that is
    /// already streaming keeps that stream instead of opening another.
    ///
    /// The [`StreamSession`] survives a repeat of the current key, so its
    /// load-more budget cannot be reset by searching again.
    pub fn start_search(
        &mut self,
        cache: &mut CacheChain,
        key: SearchKey,
    ) -> Result<SearchStart, SessionError> {
        if self.key.as_ref() == Some(&key)
            && !self.loading_more
            && let Some(request_id) = self.in_flight_request_id
        {
            log::debug!("Search {} already streaming as request {}", key, request_id);
            return Ok(SearchStart::Streaming { request_id });
        }

        self.cancel_in_flight_request();
        if self.key.as_ref() != Some(&key) || self.session.is_none() {
            self.session = Some(StreamSession::default());
        }
        self.key = Some(key.clone());
        self.loading_more = false;

        if let Some(entry) = cache.get_cached_result(&key) {
            let count = entry.suggestions.len();
            self.can_load_more =
                count >= self.limits.initial_threshold && self.has_attempts_left();
            self.ingestor = StreamIngestor::from_cache(entry.suggestions);
            log::debug!("Search {} served from cache ({} suggestions)", key, count);
            return Ok(SearchStart::Cached { count });
        }

        // A fresh first batch opens a new server session
        if let Some(session) = self.session.as_mut() {
            session.session_id = None;
        }
        self.can_load_more = false;
        self.ingestor = StreamIngestor::new();
        let request_id = self.send_request(SearchRequest::initial(&key))?;
        Ok(SearchStart::Streaming { request_id })
    }

    /// Ask for more results for the current search
    ///
    /// Returns `Ok(false)` without contacting the backend when load-more is
    /// not available (budget spent or the last batch was too small).
    pub fn load_more(&mut self) -> Result<bool, SessionError> {
        let (Some(key), Some(session)) = (self.key.clone(), self.session.as_mut()) else {
            return Err(SessionError::NoActiveSearch);
        };
        if self.in_flight_request_id.is_some() {
            return Err(SessionError::LoadMoreInFlight);
        }
        if !self.can_load_more || session.attempts >= self.limits.max_attempts {
            log::debug!(
                "Load-more refused for {} (attempt {} of {})",
                key,
                session.attempts,
                self.limits.max_attempts
            );
            self.can_load_more = false;
            return Ok(false);
        }

        let request = match &session.session_id {
            Some(session_id) => SearchRequest::resume(&key, session_id.clone()),
            None => {
                let words: Vec<String> = self
                    .ingestor
                    .suggestions()
                    .iter()
                    .map(|s| s.word.clone())
                    .collect();
                session.excluded_words.extend(words.iter().cloned());
                SearchRequest::excluding(&key, words)
            }
        };
        session.attempts += 1;
        let session_id = session.session_id.clone();

        let previous = std::mem::take(&mut self.ingestor).into_suggestions();
        self.ingestor = StreamIngestor::continuing(previous, session_id);
        self.loading_more = true;
        self.can_load_more = false;
        self.send_request(request)?;
        Ok(true)
    }

    /// Cancel the current search and forget its continuation state
    ///
    /// Returns true if a stream was in flight.
    pub fn cancel_search(&mut self) -> bool {
        let had_stream = self.cancel_in_flight_request();
        self.ingestor.cancel();
        self.session = None;
        self.can_load_more = false;
        had_stream
    }

    /// Apply one worker response
    ///
    /// Returns `None` for a response of a superseded request.
    pub fn handle_response(
        &mut self,
        cache: &mut CacheChain,
        response: SearchResponse,
    ) -> Option<IngestUpdate> {
        let request_id = response.request_id();
        if self.in_flight_request_id != Some(request_id) {
            log::debug!(
                "Discarding stale response for request {} (current {})",
                request_id,
                self.request_id
            );
            return None;
        }

        let update = match response {
            SearchResponse::Event { event, .. } => self.ingestor.handle_event(event),
            SearchResponse::Ended { .. } => self.ingestor.end_of_stream(),
            SearchResponse::Error { message, .. } => self.ingestor.fail(message),
            SearchResponse::Cancelled { .. } => self.ingestor.cancel(),
        };

        match &update {
            IngestUpdate::SessionId(id) => {
                if let Some(session) = self.session.as_mut()
                    && session.session_id.is_none()
                {
                    session.session_id = Some(id.clone());
                }
            }
            IngestUpdate::Completed { total } => {
                let total = *total;
                self.commit(cache, total);
            }
            _ => {}
        }

        if self.ingestor.state().is_terminal() {
            self.release_request();
        }
        Some(update)
    }

    /// Apply every response waiting on the channel without blocking
    pub fn poll_responses(&mut self, cache: &mut CacheChain) -> Vec<IngestUpdate> {
        let mut updates = Vec::new();
        loop {
            match self.response_rx.try_recv() {
                Ok(response) => updates.extend(self.handle_response(cache, response)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.in_flight_request_id.is_some() {
                        updates.push(self.ingestor.fail(SessionError::WorkerDisconnected.to_string()));
                        self.release_request();
                    }
                    break;
                }
            }
        }
        updates
    }

    /// Block for the next response and apply it
    ///
    /// `Ok(None)` means the response was stale.
    pub fn wait_response(
        &mut self,
        cache: &mut CacheChain,
    ) -> Result<Option<IngestUpdate>, SessionError> {
        match self.response_rx.recv() {
            Ok(response) => Ok(self.handle_response(cache, response)),
            Err(_) => {
                if self.in_flight_request_id.is_some() {
                    self.ingestor.fail(SessionError::WorkerDisconnected.to_string());
                    self.release_request();
                }
                Err(SessionError::WorkerDisconnected)
            }
        }
    }

    /// Commit a completed attempt unless it was cancelled meanwhile
    fn commit(&mut self, cache: &mut CacheChain, total: u64) {
        let cancelled = self
            .current_cancel_token
            .as_ref()
            .is_some_and(|t| t.is_cancelled());
        let Some(key) = self.key.as_ref().filter(|_| !cancelled) else {
            self.ingestor.cancel();
            return;
        };

        cache.set_cached_result(key, self.ingestor.suggestions().to_vec());
        self.ingestor.finish();

        self.can_load_more = self.has_attempts_left()
            && if self.loading_more {
                self.ingestor.new_items().len() >= self.limits.continuation_threshold
            } else {
                total >= self.limits.initial_threshold as u64
            };
        log::debug!(
            "Committed {} suggestions for {} (load more: {})",
            self.ingestor.suggestions().len(),
            key,
            self.can_load_more
        );
    }

    fn has_attempts_left(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.attempts < self.limits.max_attempts)
    }

    fn send_request(&mut self, request: SearchRequest) -> Result<u64, SessionError> {
        self.request_id += 1;
        let request_id = self.request_id;
        let cancel_token = CancellationToken::new();

        self.ingestor.start();
        self.current_cancel_token = Some(cancel_token.clone());
        self.in_flight_request_id = Some(request_id);

        let sent = self.request_tx.send(WorkerRequest::Search {
            request,
            request_id,
            cancel_token,
        });
        if sent.is_err() {
            self.ingestor.fail(SessionError::WorkerDisconnected.to_string());
            self.release_request();
            return Err(SessionError::WorkerDisconnected);
        }
        log::debug!("Sent search request {}", request_id);
        Ok(request_id)
    }

    /// Cancel the token of the request in flight, if any
    fn cancel_in_flight_request(&mut self) -> bool {
        if let Some(token) = self.current_cancel_token.take() {
            log::debug!(
                "Cancelling in-flight request {:?}",
                self.in_flight_request_id
            );
            token.cancel();
            self.in_flight_request_id = None;
            return true;
        }
        false
    }

    fn release_request(&mut self) {
        self.current_cancel_token = None;
        self.in_flight_request_id = None;
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight_request_id.is_some()
    }

    pub fn can_load_more(&self) -> bool {
        self.can_load_more
    }

    pub fn current_request_id(&self) -> u64 {
        self.request_id
    }

    pub fn key(&self) -> Option<&SearchKey> {
        self.key.as_ref()
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> &StreamState {
        self.ingestor.state()
    }

    pub fn ingestor(&self) -> &StreamIngestor {
        &self.ingestor
    }

    pub fn suggestions(&self) -> &[KeywordSuggestion] {
        self.ingestor.suggestions()
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
