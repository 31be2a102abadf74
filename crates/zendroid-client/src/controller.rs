//! Run controller: the single consumer of session output.
//!
//! The controller owns the reconciler, the active session and a generation
//! counter. Every reset bumps the generation; each session stamps its
//! messages with the generation it was opened under, and anything that does
//! not match the current one is dropped before it can touch state. This
//! covers a poll response that resolves after teardown as well as a socket
//! frame that was already queued when the run was replaced.

use tokio::sync::mpsc;
use tracing::{debug, info};
use zendroid_core::{ChatTranscript, ClientError, EventReconciler, InputGate, Reduction, RunId, RunState};
use zendroid_settings::ZendroidSettings;

use crate::api::ApiClient;
use crate::launcher::RunLauncher;
use crate::transport::{open_session, SendOutcome, SessionMessage, TransportEvent, TransportSession};

pub struct RunController {
    settings: ZendroidSettings,
    api: ApiClient,
    launcher: RunLauncher,
    generation: u64,
    reconciler: EventReconciler,
    run_id: Option<RunId>,
    session: Option<Box<dyn TransportSession>>,
    live: bool,
    tx: mpsc::Sender<SessionMessage>,
    rx: mpsc::Receiver<SessionMessage>,
}

impl RunController {
    pub fn new(settings: ZendroidSettings) -> Result<Self, ClientError> {
        let api = ApiClient::new(&settings.server)?;
        let launcher = RunLauncher::new(api.clone());
        let (tx, rx) = mpsc::channel(settings.transport.event_buffer.max(1));
        Ok(Self {
            settings,
            api,
            launcher,
            generation: 0,
            reconciler: EventReconciler::new(),
            run_id: None,
            session: None,
            live: false,
            tx,
            rx,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> &RunState {
        self.reconciler.state()
    }

    pub fn transcript(&self) -> &ChatTranscript {
        self.reconciler.transcript()
    }

    pub fn gate(&self) -> InputGate {
        self.reconciler.gate()
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the agent has announced the end of the run. A `complete`
    /// envelope need not carry a status, so this can be true while
    /// [`RunState::status`] is still non-terminal.
    pub fn is_complete(&self) -> bool {
        self.reconciler.is_complete()
    }

    /// Whether the current session can still produce output.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Create a run and attach to it. If creation fails the current run, if
    /// any, is left untouched.
    pub async fn start(&mut self, apk_path: &str, instructions: &str) -> Result<RunId, ClientError> {
        let run_id = self.launcher.start_run(apk_path, instructions).await?;
        self.attach(run_id.clone()).await;
        Ok(run_id)
    }

    /// Discard the current run and open the configured transport against
    /// `run_id` with fresh state.
    pub async fn attach(&mut self, run_id: RunId) {
        self.reset().await;
        let session = open_session(&self.settings, &self.api, run_id.clone(), self.generation, self.tx.clone());
        info!(
            run_id = %run_id,
            generation = self.generation,
            transport = ?session.mode(),
            "attached to run"
        );
        self.session = Some(session);
        self.run_id = Some(run_id);
        self.live = true;
    }

    /// Close the active session and drop all run state. Output already queued
    /// by the old session is discarded by generation.
    pub async fn reset(&mut self) {
        self.generation += 1;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.reconciler = EventReconciler::new();
        self.run_id = None;
        self.live = false;
        debug!(generation = self.generation, "controller reset");
    }

    /// Wait for and apply the next message from the current session.
    ///
    /// Returns `None` once the session has disconnected or when nothing is
    /// attached.
    pub async fn next(&mut self) -> Option<Reduction> {
        while self.live {
            let message = self.rx.recv().await?;
            if let Some(reduction) = self.handle(message) {
                return Some(reduction);
            }
        }
        None
    }

    /// Apply one session message. Returns `None` if it belongs to a
    /// superseded generation.
    pub fn handle(&mut self, message: SessionMessage) -> Option<Reduction> {
        if message.generation != self.generation {
            debug!(
                stale = message.generation,
                current = self.generation,
                kind = message.event.kind(),
                "discarding stale session output"
            );
            return None;
        }

        let reduction = match message.event {
            TransportEvent::Connected => match &self.run_id {
                Some(run_id) => self.reconciler.note_connected(run_id),
                None => Reduction::default(),
            },
            TransportEvent::Inbound(event) => self.reconciler.apply(&event),
            TransportEvent::Snapshot { tick, snapshot } => {
                debug!(tick, "applying snapshot");
                self.reconciler.apply_snapshot(&snapshot)
            }
            TransportEvent::ChannelError(error) => self.reconciler.note_channel_error(&error),
            TransportEvent::Disconnected { reason } => {
                self.live = false;
                self.reconciler.note_disconnected(reason.as_deref())
            }
        };
        Some(reduction)
    }

    /// Send a human reply exactly as typed. The transcript and gate change
    /// only when the transport delivered the message.
    pub async fn reply(&mut self, text: &str) -> Result<SendOutcome, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::validation("reply is empty"));
        }
        let Some(session) = &self.session else {
            return Ok(SendOutcome::NotConnected);
        };

        let outcome = session.send(text).await;
        match outcome {
            SendOutcome::Sent => {
                self.reconciler.record_user_reply(text);
            }
            SendOutcome::NotConnected | SendOutcome::Unsupported => {
                info!(outcome = ?outcome, "reply not delivered");
            }
        }
        Ok(outcome)
    }

    /// Tear down without attaching anything new.
    pub async fn shutdown(&mut self) {
        self.reset().await;
    }
}
