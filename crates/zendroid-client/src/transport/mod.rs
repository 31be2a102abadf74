//! Transport sessions: the two ways run events reach the client.
//!
//! A session never touches run state. It pushes [`SessionMessage`]s, tagged
//! with the generation it was opened under, into the controller's queue; the
//! queue is the in-order, finite-until-closed sequence of everything the
//! session observed.

pub mod duplex;
pub mod polling;

use async_trait::async_trait;
use tokio::sync::mpsc;
use zendroid_core::{ClientError, InboundEvent, PollSnapshot, RunId};
use zendroid_settings::{TransportMode, ZendroidSettings};

use crate::api::ApiClient;

pub use duplex::DuplexSession;
pub use polling::PollingSession;

/// Connection lifecycle. `Disconnected` after `Connected` is terminal for the
/// session instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Something a session observed.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// Duplex channel is ready.
    Connected,
    /// A parsed envelope from the duplex channel.
    Inbound(InboundEvent),
    /// A full-state response from the polling transport. `tick` is the
    /// dispatch sequence number, kept for diagnostics only: snapshots are
    /// applied in arrival order.
    Snapshot { tick: u64, snapshot: PollSnapshot },
    /// Channel-level failure. The session may still be alive.
    ChannelError(ClientError),
    /// Session ended. Nothing follows for this generation.
    Disconnected { reason: Option<String> },
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Inbound(_) => "inbound",
            Self::Snapshot { .. } => "snapshot",
            Self::ChannelError(_) => "channel_error",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}

/// A [`TransportEvent`] tagged with the generation of the session that
/// produced it.
#[derive(Clone, Debug)]
pub struct SessionMessage {
    pub generation: u64,
    pub event: TransportEvent,
}

/// Result of [`TransportSession::send`]. Rejected replies are dropped, never
/// queued for later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was written to the socket.
    Sent,
    NotConnected,
    Unsupported,
}

/// Sending half handed to a session; stamps every event with the session's
/// generation.
#[derive(Clone, Debug)]
pub struct SessionEmitter {
    generation: u64,
    tx: mpsc::Sender<SessionMessage>,
}

impl SessionEmitter {
    pub fn new(generation: u64, tx: mpsc::Sender<SessionMessage>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the controller has gone away.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionMessage {
                generation: self.generation,
                event,
            })
            .await
            .is_ok()
    }
}

/// One open channel to a run, push or pull.
#[async_trait]
pub trait TransportSession: Send + Sync {
    fn mode(&self) -> TransportMode;

    fn run_id(&self) -> &RunId;

    fn generation(&self) -> u64;

    fn connection_state(&self) -> ConnectionState;

    /// Deliver a human reply to the agent.
    async fn send(&self, text: &str) -> SendOutcome;

    /// Tear the session down. Idempotent.
    async fn close(&self);
}

/// Open the session configured in `settings` against `run_id`.
pub fn open_session(
    settings: &ZendroidSettings,
    api: &ApiClient,
    run_id: RunId,
    generation: u64,
    events: mpsc::Sender<SessionMessage>,
) -> Box<dyn TransportSession> {
    let emitter = SessionEmitter::new(generation, events);
    match settings.transport.mode {
        TransportMode::Duplex => Box::new(DuplexSession::open(
            &settings.server.resolved_ws_url(),
            run_id,
            emitter,
        )),
        TransportMode::Polling => Box::new(PollingSession::open(
            api.clone(),
            run_id,
            std::time::Duration::from_millis(settings.transport.poll_interval_ms.max(1)),
            emitter,
        )),
    }
}
