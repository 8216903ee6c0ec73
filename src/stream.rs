//! Streaming search transport and ingestion
//!
//! Bytes come off the wire in [`client`], are split into typed events by
//! [`frame`] inside the background [`worker`], and are folded into an ordered
//! suggestion list by the [`ingestor`] state machine on the caller's thread.

pub mod client;
pub mod frame;
pub mod ingestor;
pub mod request;
pub mod worker;

pub use client::{ByteStream, SearchBackend, SearchClient, SearchError};
pub use frame::{FrameParser, StreamEvent};
pub use ingestor::{IngestUpdate, StreamIngestor, StreamState};
pub use request::SearchRequest;
pub use worker::{SearchResponse, WorkerRequest, spawn_worker};
