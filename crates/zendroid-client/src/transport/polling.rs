//! Pull-based session: fetch a full snapshot every interval.
//!
//! Ticks never wait on each other. When a response takes longer than the
//! interval, a later request can resolve first; snapshots are forwarded in
//! arrival order and the reconciler treats them as last-writer-wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zendroid_core::RunId;
use zendroid_settings::TransportMode;

use super::{ConnectionState, SendOutcome, SessionEmitter, TransportEvent, TransportSession};
use crate::api::ApiClient;

pub struct PollingSession {
    run_id: RunId,
    generation: u64,
    state: Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
    _ticker: JoinHandle<()>,
}

impl PollingSession {
    pub fn open(api: ApiClient, run_id: RunId, interval: Duration, emitter: SessionEmitter) -> Self {
        let generation = emitter.generation();
        let cancel = CancellationToken::new();
        let state = Arc::new(RwLock::new(ConnectionState::Connected));

        info!(run_id = %run_id, generation, interval_ms = interval.as_millis() as u64, "starting status polling");

        let ticker = tokio::spawn(poll_loop(api, run_id.clone(), interval, cancel.clone(), emitter));

        Self {
            run_id,
            generation,
            state,
            cancel,
            _ticker: ticker,
        }
    }
}

impl Drop for PollingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl TransportSession for PollingSession {
    fn mode(&self) -> TransportMode {
        TransportMode::Polling
    }

    fn run_id(&self) -> &RunId {
        &self.run_id
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn send(&self, _text: &str) -> SendOutcome {
        debug!(run_id = %self.run_id, "polling transport cannot carry replies");
        SendOutcome::Unsupported
    }

    async fn close(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        self.cancel.cancel();
    }
}

async fn poll_loop(
    api: ApiClient,
    run_id: RunId,
    interval: Duration,
    cancel: CancellationToken,
    emitter: SessionEmitter,
) {
    if !emitter.emit(TransportEvent::Connected).await {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tick += 1;
                tokio::spawn(fetch_once(
                    api.clone(),
                    run_id.clone(),
                    tick,
                    cancel.clone(),
                    emitter.clone(),
                ));
            }
        }
    }

    debug!(run_id = %run_id, ticks = tick, "status polling stopped");
}

async fn fetch_once(
    api: ApiClient,
    run_id: RunId,
    tick: u64,
    cancel: CancellationToken,
    emitter: SessionEmitter,
) {
    let result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = api.fetch_status(&run_id) => result,
    };

    match result {
        Ok(snapshot) => {
            if cancel.is_cancelled() {
                debug!(run_id = %run_id, tick, "discarding snapshot resolved after close");
                return;
            }
            let _ = emitter.emit(TransportEvent::Snapshot { tick, snapshot }).await;
        }
        // Quiet on purpose: a transient failure is retried by the next tick.
        Err(e) => warn!(run_id = %run_id, tick, error = %e, "status poll failed"),
    }
}
