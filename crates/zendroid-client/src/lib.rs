//! # zendroid-client
//!
//! Network side of the Zendroid client: HTTP API calls, run launching, the
//! duplex and polling transports, and the [`RunController`] that applies
//! their output to a single run's state.

#![deny(unsafe_code)]

pub mod api;
pub mod controller;
pub mod launcher;
pub mod transport;

pub use api::{ApiClient, UploadReceipt};
pub use controller::RunController;
pub use launcher::RunLauncher;
pub use transport::{
    open_session, ConnectionState, DuplexSession, PollingSession, SendOutcome, SessionEmitter, SessionMessage,
    TransportEvent, TransportSession,
};
