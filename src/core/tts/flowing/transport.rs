//! Websocket transport behind a narrow channel abstraction.
//!
//! The controller never touches the socket directly; it sends JSON text
//! through a [`ChannelSender`] and consumes [`ChannelEvent`]s from a
//! receiver. The [`SynthTransport`] trait exists so tests can substitute
//! a scripted in-process channel for the real connection.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::core::tts::base::{TtsError, TtsResult};

/// Inbound traffic from an open channel.
#[derive(Debug)]
pub enum ChannelEvent {
    /// JSON control event
    Text(String),
    /// Raw s16le PCM audio frame
    Binary(Bytes),
    /// The channel is gone; no further events will arrive
    Closed,
}

/// Outbound half of an open channel. Dropping it closes the connection.
pub struct ChannelSender {
    tx: mpsc::Sender<String>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl ChannelSender {
    pub(crate) fn new(tx: mpsc::Sender<String>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            tx,
            shutdown: Some(shutdown),
        }
    }

    /// Queues a control message for sending. Fire-and-forget: a full queue
    /// or closed connection drops the message with a warning.
    pub fn send(&self, text: String) {
        if let Err(e) = self.tx.try_send(text) {
            warn!("dropping outbound control message: {e}");
        }
    }

    /// Closes the connection gracefully.
    pub fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for ChannelSender {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// An open duplex channel to the gateway.
pub struct SynthChannel {
    pub sender: ChannelSender,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Opens channels to the synthesis gateway.
#[async_trait]
pub trait SynthTransport: Send + Sync {
    async fn open(&self, url: &str) -> TtsResult<SynthChannel>;
}

/// Production transport over tokio-tungstenite.
pub struct WsTransport;

#[async_trait]
impl SynthTransport for WsTransport {
    async fn open(&self, url: &str) -> TtsResult<SynthChannel> {
        let (ws_stream, _response) = connect_async(url).await.map_err(|e| {
            TtsError::ConnectionFailed(format!("Failed to connect to gateway: {e}"))
        })?;
        info!("synthesis gateway channel open");

        let (mut ws_sink, mut ws_source) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = out_rx.recv() => {
                        let Some(text) = outgoing else { break };
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            error!("failed to send control message: {e}");
                            let _ = event_tx.try_send(ChannelEvent::Closed);
                            break;
                        }
                    }
                    incoming = ws_source.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let _ = event_tx.send(ChannelEvent::Text(text.to_string())).await;
                            }
                            Some(Ok(Message::Binary(data))) => {
                                let _ = event_tx.send(ChannelEvent::Binary(data)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                debug!("server closed channel: {frame:?}");
                                let _ = event_tx.try_send(ChannelEvent::Closed);
                                break;
                            }
                            // ping/pong are answered by tungstenite itself
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!("websocket error: {e}");
                                let _ = event_tx.try_send(ChannelEvent::Closed);
                                break;
                            }
                            None => {
                                let _ = event_tx.try_send(ChannelEvent::Closed);
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("channel task finished");
        });

        Ok(SynthChannel {
            sender: ChannelSender::new(out_tx, shutdown_tx),
            events: event_rx,
        })
    }
}
