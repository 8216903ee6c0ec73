//! Search sessions: one active stream, its continuation state, and the
//! load-more budget

mod controller;

pub use controller::{SearchStart, SessionController, SessionError, StreamSession};
