// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Socket Mode websocket session.
//!
//! A background task owns the websocket. Decoded envelopes are forwarded on
//! a channel and acknowledgements travel back on another one, so the reader
//! never waits on the collector. When Slack sends a `disconnect` envelope or
//! closes the socket, the task asks the [`ConnectionOpener`] for a fresh URL
//! and reconnects. Only the first handshake is allowed to fail the session;
//! later failures are retried until they succeed or the session is cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::event::SocketEvent;
use crate::transport::{backoff, retry_rate_limited, EventStream};

const EVENT_BUFFER_SIZE: usize = 64;

/// Hands out websocket URLs (`apps.connections.open`).
#[async_trait]
pub trait ConnectionOpener: Send + Sync {
    async fn open_connection(&self) -> Result<String, TransportError>;
}

pub struct SocketModeClient {
    events: mpsc::Receiver<SocketEvent>,
    acks: mpsc::UnboundedSender<String>,
    session: Option<JoinHandle<Result<(), TransportError>>>,
}

impl SocketModeClient {
    /// Opens the first connection URL and starts the session task.
    ///
    /// Failing to obtain that first URL is returned immediately. Reconnects
    /// wait `retry_delay` between failed attempts.
    pub async fn connect<O>(
        opener: Arc<O>,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError>
    where
        O: ConnectionOpener + ?Sized + 'static,
    {
        let url = opener.open_connection().await?;
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (acks, acks_rx) = mpsc::unbounded_channel();
        let session = Session {
            opener,
            events: events_tx,
            acks: acks_rx,
            retry_delay,
            cancel,
        };
        Ok(SocketModeClient {
            events,
            acks,
            session: Some(tokio::spawn(session.run(url))),
        })
    }
}

#[async_trait]
impl EventStream for SocketModeClient {
    async fn next_event(&mut self) -> Result<Option<SocketEvent>, TransportError> {
        if let Some(event) = self.events.recv().await {
            return Ok(Some(event));
        }
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        match session.await {
            Ok(result) => result.map(|()| None),
            Err(e) => Err(TransportError::WebSocket(format!(
                "socket mode session task failed: {e}"
            ))),
        }
    }

    async fn ack(&mut self, envelope_id: &str) -> Result<(), TransportError> {
        self.acks
            .send(envelope_id.to_string())
            .map_err(|_| TransportError::WebSocket("socket mode session is closed".to_string()))
    }
}

struct Session<O: ?Sized> {
    opener: Arc<O>,
    events: mpsc::Sender<SocketEvent>,
    acks: mpsc::UnboundedReceiver<String>,
    retry_delay: Duration,
    cancel: CancellationToken,
}

enum SessionEnd {
    Reconnect,
    Stop,
}

impl<O> Session<O>
where
    O: ConnectionOpener + ?Sized,
{
    async fn run(mut self, first_url: String) -> Result<(), TransportError> {
        let mut url = first_url;
        let mut reconnecting = false;
        loop {
            if self.events.send(SocketEvent::Connecting).await.is_err() {
                return Ok(());
            }
            match self.connection(&url).await {
                Ok(SessionEnd::Stop) => return Ok(()),
                Ok(SessionEnd::Reconnect) => info!("SLACK | Reconnecting to Socket Mode"),
                Err(e) if !reconnecting => return Err(e),
                Err(e) => {
                    warn!(
                        "SLACK | Failed to connect to Socket Mode: {e}, retrying in {:?}",
                        self.retry_delay
                    );
                    if !backoff(&self.cancel, self.retry_delay).await {
                        return Ok(());
                    }
                }
            }
            reconnecting = true;
            url = match self.open_url().await {
                Some(url) => url,
                None => return Ok(()),
            };
        }
    }

    /// Asks for a fresh connection URL until one is handed out. `None` means
    /// the session was cancelled while waiting.
    async fn open_url(&self) -> Option<String> {
        loop {
            match retry_rate_limited(
                &self.cancel,
                self.retry_delay,
                "apps.connections.open",
                || self.opener.open_connection(),
            )
            .await
            {
                Ok(url) => return Some(url),
                Err(TransportError::Cancelled) => return None,
                Err(e) => {
                    warn!(
                        "SLACK | Failed to open Socket Mode connection: {e}, retrying in {:?}",
                        self.retry_delay
                    );
                    if !backoff(&self.cancel, self.retry_delay).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Serves one websocket connection. Only the handshake is reported as an
    /// error; a connection that breaks afterwards ends with a reconnect.
    async fn connection(&mut self, url: &str) -> Result<SessionEnd, TransportError> {
        let (stream, _) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(SessionEnd::Stop),
            connected = connect_async(url) => connected.map_err(ws_error)?,
        };
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    if let Err(e) = write.send(WsMessage::Close(None)).await {
                        debug!("SLACK | Failed to close socket mode connection: {e}");
                    }
                    return Ok(SessionEnd::Stop);
                }
                Some(envelope_id) = self.acks.recv() => {
                    if let Err(e) = write.send(WsMessage::Text(ack_payload(&envelope_id))).await {
                        warn!("SLACK | Failed to send ack for envelope {envelope_id}: {e}");
                        return Ok(SessionEnd::Reconnect);
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => match SocketEvent::from_frame(&text) {
                        Ok(event) => {
                            let disconnect = matches!(event, SocketEvent::Disconnect { .. });
                            if self.events.send(event).await.is_err() {
                                return Ok(SessionEnd::Stop);
                            }
                            if disconnect {
                                return Ok(SessionEnd::Reconnect);
                            }
                        }
                        Err(e) => warn!("SLACK | Dropping undecodable socket mode frame: {e}"),
                    },
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if let Err(e) = write.send(WsMessage::Pong(payload)).await {
                            warn!("SLACK | Failed to answer socket mode ping: {e}");
                            return Ok(SessionEnd::Reconnect);
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => return Ok(SessionEnd::Reconnect),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("SLACK | Socket mode connection failed: {e}");
                        return Ok(SessionEnd::Reconnect);
                    }
                },
            }
        }
    }
}

fn ack_payload(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::WebSocket(e.to_string())
}
