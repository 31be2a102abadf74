//! Test doubles for the agent server.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A one-connection WebSocket agent. Frames pushed with [`MockAgent::push`]
/// go to the client; frames the client sends are collected for
/// [`MockAgent::recv`].
pub struct MockAgent {
    pub ws_base: String,
    path: Arc<Mutex<Option<String>>>,
    to_client: mpsc::UnboundedSender<Message>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockAgent {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let path = Arc::new(Mutex::new(None));
        let (to_client, mut outgoing) = mpsc::unbounded_channel::<Message>();
        let (incoming, from_client) = mpsc::unbounded_channel::<String>();

        let seen_path = Arc::clone(&path);
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                *seen_path.lock() = Some(req.uri().path().to_string());
                Ok(resp)
            };
            let ws = accept_hdr_async(stream, callback).await.unwrap();
            let (mut tx, mut rx) = ws.split();

            loop {
                tokio::select! {
                    frame = outgoing.recv() => {
                        let Some(frame) = frame else { break };
                        let closing = matches!(frame, Message::Close(_));
                        if tx.send(frame).await.is_err() || closing {
                            break;
                        }
                    }
                    msg = rx.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = incoming.send(text.as_str().to_owned());
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        });

        Self {
            ws_base: format!("ws://{addr}"),
            path,
            to_client,
            from_client,
        }
    }

    pub fn push(&self, event: Value) {
        self.to_client.send(Message::Text(event.to_string().into())).unwrap();
    }

    pub fn push_raw(&self, text: &str) {
        self.to_client.send(Message::Text(text.to_string().into())).unwrap();
    }

    pub fn close(&self) {
        let _ = self.to_client.send(Message::Close(None));
    }

    /// Next frame sent by the client, parsed as JSON.
    pub async fn recv(&mut self) -> Value {
        let text = timeout(TIMEOUT, self.from_client.recv()).await.unwrap().unwrap();
        serde_json::from_str(&text).unwrap()
    }

    /// Request path of the accepted handshake.
    pub fn path(&self) -> Option<String> {
        self.path.lock().clone()
    }
}
