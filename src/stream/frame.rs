//! Frame decoding for the search stream
//!
//! The body is newline-delimited text. Only `data: <json>` lines carry
//! events; everything else is ignored. Bytes are buffered until a newline
//! arrives, so a code point split across chunks is decoded whole.

use serde::{Deserialize, Serialize};

use crate::model::KeywordSuggestion;

const DATA_PREFIX: &str = "data:";

/// One decoded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Suggestion {
        data: KeywordSuggestion,
    },
    Progress {
        count: u64,
    },
    Complete {
        total: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// Decode one JSON payload. `None` if it is not a known event.
    pub fn parse(payload: &str) -> Option<Self> {
        match serde_json::from_str(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                log::debug!("Skipping malformed frame: {} ({})", payload, e);
                None
            }
        }
    }
}

/// Incremental line splitter for the stream body
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the events of every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line).into_iter().collect()
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn parse_line(line: &[u8]) -> Option<StreamEvent> {
        let Ok(text) = std::str::from_utf8(line) else {
            log::debug!("Skipping frame with invalid UTF-8 ({} bytes)", line.len());
            return None;
        };

        let payload = text.trim().strip_prefix(DATA_PREFIX)?.trim_start();
        if payload.is_empty() {
            return None;
        }
        StreamEvent::parse(payload)
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod frame_tests;
