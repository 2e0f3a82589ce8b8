//! # Town Authority Host
//!
//! Runs the authoritative session on a fixed timer, without rendering.
//!
//! The session is single-threaded (`Rc` inside), so the host loop runs on a
//! [`tokio::task::LocalSet`]. Everything that talks to it goes through a
//! [`HostHandle`], which is `Send` and cheap to clone. Observers join with a
//! snapshot plus a broadcast stream of encoded frames.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod console;
pub mod host;

pub use host::{AuthorityHost, HostError, HostHandle, ObserverLink};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Tick rate; overrides the session config when set.
    pub tick_rate: Option<u32>,
    /// Maximum observers joined at once.
    pub max_observers: usize,
    /// Frames buffered per observer before it lags.
    pub frame_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: None,
            max_observers: 8,
            frame_buffer: 4096,
        }
    }
}
