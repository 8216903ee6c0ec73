//! Stream ingestion state machine
//!
//! One ingestor covers one attempt: the initial stream or a single load-more
//! round. It never touches storage; the session controller decides what to
//! commit once the attempt reaches `Completing`.

use std::time::Duration;

use super::frame::StreamEvent;
use crate::model::KeywordSuggestion;

/// Delay between consecutive suggestions of one batch when presented
pub const STAGGER_STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    /// `complete` received, waiting for the commit
    Completing,
    Complete,
    Errored(String),
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamState::Complete | StreamState::Errored(_) | StreamState::Cancelled
        )
    }

    /// Connecting or streaming
    pub fn is_active(&self) -> bool {
        matches!(self, StreamState::Connecting | StreamState::Streaming)
    }
}

/// What applying one event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestUpdate {
    /// No observable change
    Ignored,
    /// A server session id became known
    SessionId(String),
    /// A suggestion was appended at this absolute index
    Suggestion(usize),
    Progress(u64),
    Completed { total: u64 },
    Failed(String),
    Cancelled,
}

#[derive(Debug, Default)]
pub struct StreamIngestor {
    state: StreamState,
    suggestions: Vec<KeywordSuggestion>,
    /// Length of the list this attempt was seeded with
    batch_start: usize,
    session_id: Option<String>,
    progress: u64,
    total: Option<u64>,
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt that appends to an earlier result list
    pub fn continuing(previous: Vec<KeywordSuggestion>, session_id: Option<String>) -> Self {
        Self {
            batch_start: previous.len(),
            progress: previous.len() as u64,
            suggestions: previous,
            session_id,
            ..Self::default()
        }
    }

    /// Finished result served from the cache; no stream is opened
    pub fn from_cache(suggestions: Vec<KeywordSuggestion>) -> Self {
        let len = suggestions.len() as u64;
        Self {
            state: StreamState::Complete,
            suggestions,
            progress: len,
            total: Some(len),
            ..Self::default()
        }
    }

    /// `Idle -> Connecting`. Returns false from any other state.
    pub fn start(&mut self) -> bool {
        if self.state != StreamState::Idle {
            return false;
        }
        self.state = StreamState::Connecting;
        log::debug!("Stream connecting (batch starts at {})", self.batch_start);
        true
    }

    /// Apply one decoded frame
    pub fn handle_event(&mut self, event: StreamEvent) -> IngestUpdate {
        if !self.state.is_active() {
            log::debug!("Ignoring frame in state {:?}", self.state);
            return IngestUpdate::Ignored;
        }
        if self.state == StreamState::Connecting {
            self.state = StreamState::Streaming;
        }

        match event {
            StreamEvent::Status { session_id } => self.record_session(session_id),
            StreamEvent::Suggestion { data } => {
                if !data.is_well_formed() {
                    log::debug!("Dropping ill-formed suggestion {:?}", data.word);
                    return IngestUpdate::Ignored;
                }
                self.suggestions.push(data);
                IngestUpdate::Suggestion(self.suggestions.len() - 1)
            }
            StreamEvent::Progress { count } => {
                self.progress = count;
                IngestUpdate::Progress(count)
            }
            StreamEvent::Complete { total, session_id } => {
                self.record_session(session_id);
                self.total = Some(total);
                self.state = StreamState::Completing;
                log::debug!(
                    "Stream completing: {} reported, {} accumulated",
                    total,
                    self.suggestions.len()
                );
                IngestUpdate::Completed { total }
            }
            StreamEvent::Error { message } => self.fail(message),
        }
    }

    /// `Completing -> Complete`, once the result has been committed
    pub fn finish(&mut self) -> bool {
        if self.state != StreamState::Completing {
            return false;
        }
        self.state = StreamState::Complete;
        true
    }

    /// Move to `Errored` unless already terminal. Partial results are kept.
    pub fn fail(&mut self, message: impl Into<String>) -> IngestUpdate {
        if self.state.is_terminal() {
            return IngestUpdate::Ignored;
        }
        let message = message.into();
        log::debug!("Stream errored: {}", message);
        self.state = StreamState::Errored(message.clone());
        IngestUpdate::Failed(message)
    }

    /// Move to `Cancelled` unless already terminal
    pub fn cancel(&mut self) -> IngestUpdate {
        if self.state.is_terminal() {
            return IngestUpdate::Ignored;
        }
        log::debug!("Stream cancelled in state {:?}", self.state);
        self.state = StreamState::Cancelled;
        IngestUpdate::Cancelled
    }

    /// The body ended. Without a prior `complete` frame that is an error.
    pub fn end_of_stream(&mut self) -> IngestUpdate {
        if self.state.is_active() {
            return self.fail("stream ended before completion");
        }
        IngestUpdate::Ignored
    }

    fn record_session(&mut self, session_id: Option<String>) -> IngestUpdate {
        match session_id {
            Some(id) if self.session_id.is_none() => {
                log::debug!("Stream session {}", id);
                self.session_id = Some(id.clone());
                IngestUpdate::SessionId(id)
            }
            _ => IngestUpdate::Ignored,
        }
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn suggestions(&self) -> &[KeywordSuggestion] {
        &self.suggestions
    }

    pub fn into_suggestions(self) -> Vec<KeywordSuggestion> {
        self.suggestions
    }

    /// Suggestions added by this attempt
    pub fn new_items(&self) -> &[KeywordSuggestion] {
        &self.suggestions[self.batch_start..]
    }

    pub fn batch_start(&self) -> usize {
        self.batch_start
    }

    /// Position of an absolute index within this attempt's batch
    pub fn batch_index(&self, index: usize) -> Option<usize> {
        if index >= self.suggestions.len() {
            return None;
        }
        index.checked_sub(self.batch_start)
    }

    /// Presentation delay for an absolute index, relative to the batch start
    pub fn stagger_delay(&self, index: usize) -> Duration {
        let position = self.batch_index(index).unwrap_or(0);
        STAGGER_STEP.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX))
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Latest progress hint, or the seeded length before any arrives
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Total from the `complete` frame
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

#[cfg(test)]
#[path = "ingestor_tests.rs"]
mod ingestor_tests;
