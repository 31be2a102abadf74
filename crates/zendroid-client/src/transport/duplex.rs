//! Push-based session over a WebSocket at `/ws/test/{run_id}`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zendroid_core::{ClientError, InboundEvent, OutboundEvent, RunId};
use zendroid_settings::TransportMode;

use super::{ConnectionState, SendOutcome, SessionEmitter, TransportEvent, TransportSession};
use crate::api::segment_url;

const OUTBOUND_QUEUE: usize = 32;

/// A reply waiting to be written, with the channel that reports whether the
/// socket write succeeded.
struct OutboundFrame {
    text: String,
    written: oneshot::Sender<bool>,
}

/// WebSocket session for one run.
///
/// `open` returns immediately in `Connecting`; the socket lives in a spawned
/// task that reports progress through the emitter.
pub struct DuplexSession {
    run_id: RunId,
    generation: u64,
    state: Arc<RwLock<ConnectionState>>,
    outbound: mpsc::Sender<OutboundFrame>,
    cancel: CancellationToken,
    _handler: JoinHandle<()>,
}

impl DuplexSession {
    pub fn open(ws_base: &str, run_id: RunId, emitter: SessionEmitter) -> Self {
        let url = channel_url(ws_base, &run_id);
        let generation = emitter.generation();
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        info!(run_id = %run_id, generation, ws_base, "opening duplex session");

        let handler = tokio::spawn(channel_loop(
            url,
            Arc::clone(&state),
            outbound_rx,
            cancel.clone(),
            emitter,
        ));

        Self {
            run_id,
            generation,
            state,
            outbound,
            cancel,
            _handler: handler,
        }
    }
}

impl Drop for DuplexSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl TransportSession for DuplexSession {
    fn mode(&self) -> TransportMode {
        TransportMode::Duplex
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

    async fn send(&self, text: &str) -> SendOutcome {
        if self.connection_state() != ConnectionState::Connected {
            debug!(run_id = %self.run_id, "reply dropped, channel not connected");
            return SendOutcome::NotConnected;
        }
        let (written, ack) = oneshot::channel();
        let frame = OutboundFrame {
            text: OutboundEvent::user_message(text).to_json(),
            written,
        };
        if self.outbound.send(frame).await.is_err() {
            debug!(run_id = %self.run_id, "reply dropped, channel task gone");
            return SendOutcome::NotConnected;
        }
        // Resolves once the frame is on the socket, or the write failed.
        match ack.await {
            Ok(true) => SendOutcome::Sent,
            Ok(false) | Err(_) => {
                debug!(run_id = %self.run_id, "reply dropped, socket write failed");
                SendOutcome::NotConnected
            }
        }
    }

    async fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(run_id = %self.run_id, generation = self.generation, "closing duplex session");
        }
        *self.state.write() = ConnectionState::Disconnected;
        self.cancel.cancel();
    }
}

/// `{ws_base}/ws/test/{run_id}`, with the run id percent-encoded as a single
/// path segment.
pub fn channel_url(ws_base: &str, run_id: &RunId) -> Result<String, ClientError> {
    let base = Url::parse(ws_base)
        .map_err(|e| ClientError::validation(format!("invalid websocket url {ws_base}: {e}")))?;
    segment_url(&base, &["ws", "test", run_id.as_str()]).map(String::from)
}

// Errors after which the stream cannot yield further frames.
fn is_fatal(err: &WsError) -> bool {
    !matches!(err, WsError::Capacity(_))
}

async fn channel_loop(
    url: Result<String, ClientError>,
    state: Arc<RwLock<ConnectionState>>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    cancel: CancellationToken,
    emitter: SessionEmitter,
) {
    let url = match url {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "cannot build duplex url");
            *state.write() = ConnectionState::Disconnected;
            let _ = emitter.emit(TransportEvent::ChannelError(e)).await;
            let _ = emitter.emit(TransportEvent::Disconnected { reason: None }).await;
            return;
        }
    };

    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = connect_async(url.as_str()) => Some(result),
    };

    let ws = match connected {
        None => {
            *state.write() = ConnectionState::Disconnected;
            let _ = emitter
                .emit(TransportEvent::Disconnected {
                    reason: Some("closed before connecting".into()),
                })
                .await;
            return;
        }
        Some(Err(e)) => {
            warn!(url = %url, error = %e, "duplex connect failed");
            *state.write() = ConnectionState::Disconnected;
            let _ = emitter
                .emit(TransportEvent::ChannelError(ClientError::transport(format!(
                    "connect failed: {e}"
                ))))
                .await;
            let _ = emitter.emit(TransportEvent::Disconnected { reason: None }).await;
            return;
        }
        Some(Ok((ws, _response))) => ws,
    };

    {
        let mut guard = state.write();
        // close() may have raced the handshake.
        if *guard == ConnectionState::Connecting {
            *guard = ConnectionState::Connected;
        }
    }
    info!(url = %url, "duplex channel connected");
    if !emitter.emit(TransportEvent::Connected).await {
        return;
    }

    let (mut ws_tx, mut ws_rx) = ws.split();

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break Some("closed by client".to_string());
            }
            frame = outbound_rx.recv() => {
                let Some(OutboundFrame { text, written }) = frame else {
                    break Some("session dropped".to_string());
                };
                let result = ws_tx.send(Message::Text(text.into())).await;
                let _ = written.send(result.is_ok());
                if let Err(e) = result {
                    warn!(error = %e, "duplex send failed");
                    let _ = emitter
                        .emit(TransportEvent::ChannelError(ClientError::transport(e.to_string())))
                        .await;
                    if is_fatal(&e) {
                        break Some(e.to_string());
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    None => break None,
                    Some(Ok(Message::Text(text))) => match InboundEvent::parse(&text) {
                        Ok(event) => {
                            debug!(event_type = %event.kind, "inbound event");
                            if !emitter.emit(TransportEvent::Inbound(event)).await {
                                break None;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, frame_len = text.len(), "dropping unparseable frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty());
                    }
                    // Ping/pong are answered by tungstenite; binary frames are not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "duplex channel error");
                        let _ = emitter
                            .emit(TransportEvent::ChannelError(ClientError::transport(e.to_string())))
                            .await;
                        if is_fatal(&e) {
                            break None;
                        }
                    }
                }
            }
        }
    };

    *state.write() = ConnectionState::Disconnected;
    info!(url = %url, reason = ?reason, "duplex channel closed");
    let _ = emitter.emit(TransportEvent::Disconnected { reason }).await;
}
