//! WebSocket channel to the journaling service.
//!
//! The channel task owns the socket for the whole session: envelopes go out
//! as JSON text frames, inbound frames are decoded here, and connection
//! transitions surface as events. The controller never touches the socket.

use anyhow::{anyhow, Context};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::config::ServerConfig;
use crate::protocol::{InboundEnvelope, OutboundEnvelope};
use crate::session::SessionId;

/// Connection transitions, in the order a frontend would render them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Errored,
}

/// Events delivered to the controller's dispatch loop.
#[derive(Debug)]
pub enum ChannelEvent {
    Inbound(InboundEnvelope),
    State(LinkState),
}

/// Commands accepted from the controller. Sends are fire-and-forget; the
/// protocol has no per-message acknowledgment.
#[derive(Debug)]
pub enum ChannelCommand {
    Send(OutboundEnvelope),
}

/// How one pass through `connect_and_loop` ended.
enum LoopEnd {
    /// Command channel closed; the session is over.
    Shutdown,
    /// The service closed an established connection.
    ServerClosed,
}

pub struct ChannelClient {
    config: ServerConfig,
    session: SessionId,
    tx: mpsc::Sender<ChannelEvent>,
    rx_cmd: mpsc::Receiver<ChannelCommand>,
}

impl ChannelClient {
    pub fn new(
        config: ServerConfig,
        session: SessionId,
        tx: mpsc::Sender<ChannelEvent>,
        rx_cmd: mpsc::Receiver<ChannelCommand>,
    ) -> Self {
        Self {
            config,
            session,
            tx,
            rx_cmd,
        }
    }

    /// Drive the connection until shutdown.
    ///
    /// With reconnection enabled, drops are retried with exponential backoff
    /// up to the configured cap; otherwise a single connection is attempted
    /// and the task ends when it does.
    pub async fn run(mut self) {
        let initial = std::time::Duration::from_secs(self.config.reconnect_initial_secs);
        let cap = std::time::Duration::from_secs(self.config.reconnect_max_secs);
        let mut retry_delay = initial;

        loop {
            let mut connected = false;
            let _ = self.tx.send(ChannelEvent::State(LinkState::Connecting)).await;

            match self.connect_and_loop(&mut connected).await {
                Ok(LoopEnd::Shutdown) => {
                    log::info!("channel shut down");
                    break;
                }
                Ok(LoopEnd::ServerClosed) => {
                    let _ = self
                        .tx
                        .send(ChannelEvent::State(LinkState::Disconnected))
                        .await;
                }
                Err(e) => {
                    log::warn!("channel error: {e:#}");
                    let _ = self.tx.send(ChannelEvent::State(LinkState::Errored)).await;
                    let _ = self
                        .tx
                        .send(ChannelEvent::State(LinkState::Disconnected))
                        .await;
                }
            }

            if !self.config.reconnect {
                break;
            }
            if self.tx.is_closed() {
                log::info!("event receiver gone, not redialing");
                break;
            }
            if connected {
                retry_delay = initial;
            }
            log::info!("reconnecting in {retry_delay:?}");
            tokio::time::sleep(retry_delay).await;
            retry_delay = std::cmp::min(retry_delay * 2, cap);
        }
    }

    /// The channel endpoint: the session id rides as the last path segment.
    fn endpoint(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.config.url)
            .with_context(|| format!("invalid server url {:?}", self.config.url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server url cannot be a base: {:?}", self.config.url))?
            .pop_if_empty()
            .push(self.session.as_str());
        Ok(url)
    }

    async fn connect_and_loop(&mut self, connected: &mut bool) -> anyhow::Result<LoopEnd> {
        let url = self.endpoint()?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(anyhow!("server url has no host: {url}")),
        };

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(url.as_str())
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())?;

        log::info!("connecting to {url}");
        let (ws_stream, _) = connect_async(request).await?;
        *connected = true;
        log::info!("channel connected as {}", self.session);

        let (mut write, mut read) = ws_stream.split();
        if self
            .tx
            .send(ChannelEvent::State(LinkState::Connected))
            .await
            .is_err()
        {
            log::info!("event receiver gone, closing channel");
            return Ok(LoopEnd::Shutdown);
        }

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if !self.dispatch_frame(&text).await {
                                return Ok(LoopEnd::Shutdown);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            // The protocol is text-only; audio travels inside
                            // envelopes, never as raw frames.
                            log::debug!("ignoring {}-byte binary frame", data.len());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("service closed the channel: {frame:?}");
                            return Ok(LoopEnd::ServerClosed);
                        }
                        Some(Ok(_)) => {} // ping/pong answered by tungstenite
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(LoopEnd::ServerClosed),
                    }
                }
                cmd = self.rx_cmd.recv() => {
                    match cmd {
                        Some(ChannelCommand::Send(envelope)) => {
                            let frame = serde_json::to_string(&envelope)?;
                            write.send(Message::Text(frame.into())).await?;
                        }
                        None => return Ok(LoopEnd::Shutdown),
                    }
                }
            }
        }
    }

    /// Decode one inbound text frame. Frames that do not parse as a known
    /// envelope are logged and dropped; the session state stays untouched.
    /// Returns false once the event receiver is gone.
    async fn dispatch_frame(&mut self, raw: &str) -> bool {
        match serde_json::from_str::<InboundEnvelope>(raw) {
            Ok(envelope) => {
                if self.tx.send(ChannelEvent::Inbound(envelope)).await.is_err() {
                    log::info!("event receiver gone, dropping inbound frame");
                    return false;
                }
            }
            Err(e) => log::warn!("dropping malformed inbound frame: {e}"),
        }
        true
    }
}
