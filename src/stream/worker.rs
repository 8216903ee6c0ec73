//! Search worker thread
//!
//! Opens search streams in a background thread so the caller never blocks on
//! the network. Requests arrive over one channel and decoded frames flow back
//! over another, each tagged with the request id that produced it.
//!
//! Uses a single-threaded tokio runtime and races every body read against the
//! request's cancellation token.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, Sender};
use std::thread::JoinHandle;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::client::{SearchBackend, SearchError};
use super::frame::{FrameParser, StreamEvent};
use super::request::SearchRequest;

/// Work for the search worker
#[derive(Debug)]
pub enum WorkerRequest {
    Search {
        request: SearchRequest,
        request_id: u64,
        cancel_token: CancellationToken,
    },
}

/// Output of the search worker
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResponse {
    /// One decoded frame, in arrival order
    Event { event: StreamEvent, request_id: u64 },
    /// The body ended normally
    Ended { request_id: u64 },
    /// Opening or reading the stream failed
    Error { message: String, request_id: u64 },
    Cancelled { request_id: u64 },
}

impl SearchResponse {
    pub fn request_id(&self) -> u64 {
        match self {
            SearchResponse::Event { request_id, .. }
            | SearchResponse::Ended { request_id }
            | SearchResponse::Error { request_id, .. }
            | SearchResponse::Cancelled { request_id } => *request_id,
        }
    }
}

/// Spawn the search worker thread
///
/// Creates a background thread with a tokio runtime that:
/// 1. Listens for requests on the request channel
/// 2. Opens each search stream with cancellation support
/// 3. Forwards decoded frames via the response channel
///
/// The thread exits once the request channel is closed. A panic inside the
/// worker is logged rather than printed over the caller's output.
pub fn spawn_worker<B>(
    backend: Result<B, SearchError>,
    request_rx: Receiver<WorkerRequest>,
    response_tx: Sender<SearchResponse>,
) -> JoinHandle<()>
where
    B: SearchBackend + 'static,
{
    std::thread::spawn(move || {
        let prev_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            log::error!(
                "Search worker panic: {} at {:?}",
                panic_message(panic_info.payload()),
                panic_info.location()
            );
        }));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            // Create a single-threaded tokio runtime for this worker thread
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to create tokio runtime: {}", e);
                    return;
                }
            };

            rt.block_on(worker_loop(backend, request_rx, response_tx));
        }));

        panic::set_hook(prev_hook);

        if let Err(e) = result {
            log::error!("Search worker thread panicked: {}", panic_message(&*e));
        }
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic in search worker".to_string()
    }
}

/// Main async worker loop - processes requests until the channel is closed
///
/// Blocking `recv()` is fine here since the loop owns a dedicated thread.
async fn worker_loop<B: SearchBackend>(
    backend: Result<B, SearchError>,
    request_rx: Receiver<WorkerRequest>,
    response_tx: Sender<SearchResponse>,
) {
    while let Ok(request) = request_rx.recv() {
        match request {
            WorkerRequest::Search {
                request,
                request_id,
                cancel_token,
            } => {
                handle_search(&backend, &request, request_id, cancel_token, &response_tx).await;
            }
        }
    }
    log::debug!("Search worker shutting down");
}

/// Run one search and report how it ended
async fn handle_search<B: SearchBackend>(
    backend: &Result<B, SearchError>,
    request: &SearchRequest,
    request_id: u64,
    cancel_token: CancellationToken,
    response_tx: &Sender<SearchResponse>,
) {
    // Check if already cancelled before starting
    if cancel_token.is_cancelled() {
        let _ = response_tx.send(SearchResponse::Cancelled { request_id });
        return;
    }

    let backend = match backend {
        Ok(backend) => backend,
        Err(e) => {
            let _ = response_tx.send(SearchResponse::Error {
                message: e.to_string(),
                request_id,
            });
            return;
        }
    };

    let response = match stream_search(backend, request, request_id, &cancel_token, response_tx)
        .await
    {
        Ok(()) => SearchResponse::Ended { request_id },
        Err(SearchError::Cancelled) => SearchResponse::Cancelled { request_id },
        Err(e) => SearchResponse::Error {
            message: e.to_string(),
            request_id,
        },
    };
    let _ = response_tx.send(response);
}

/// Read a stream to its end, forwarding events as lines complete
///
/// Uses `tokio::select!` in biased mode so a cancellation is seen before the
/// next chunk is consumed.
async fn stream_search<B: SearchBackend>(
    backend: &B,
    request: &SearchRequest,
    request_id: u64,
    cancel_token: &CancellationToken,
    response_tx: &Sender<SearchResponse>,
) -> Result<(), SearchError> {
    let mut body = tokio::select! {
        biased;

        _ = cancel_token.cancelled() => {
            log::debug!("Request {} cancelled while connecting", request_id);
            return Err(SearchError::Cancelled);
        }

        opened = backend.open(request) => opened?,
    };

    let mut parser = FrameParser::new();
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                log::debug!("Request {} cancelled during streaming", request_id);
                return Err(SearchError::Cancelled);
            }

            chunk = body.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        if !forward(parser.push(&bytes), request_id, response_tx) {
                            // Caller disconnected
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
        }
    }

    forward(parser.finish(), request_id, response_tx);
    Ok(())
}

/// Returns false once the receiving side is gone
fn forward(
    events: Vec<StreamEvent>,
    request_id: u64,
    response_tx: &Sender<SearchResponse>,
) -> bool {
    events.into_iter().all(|event| {
        response_tx
            .send(SearchResponse::Event { event, request_id })
            .is_ok()
    })
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod worker_tests;
