// SPDX-License-Identifier: MIT OR Apache-2.0
//! The resilient, multiplexed WebSocket transport.
//!
//! One socket carries every subscriber's `SUB`/`UNSUB`/`BOOK` traffic and
//! the graph stream itself. A background actor task owns the socket; the
//! [`WsTransport`] handle only ever talks to it over channels, so it can
//! be cloned freely and implements [`fg_subscription::Network`] by
//! combining this socket (for streaming) with a plain HTTP call (for
//! targeted `load`s).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fg_model::{Envelope, Reference};
use fg_retry::{compute_delay, CancellationToken, RetryConfig};
use fg_subscription::{FeedChunk, Network, NetworkError};
use futures::stream::{BoxStream, SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::clock::{Clock, RealClock};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::negotiate::Negotiator;
use crate::protocol::{ControlFrame, FrameRouter, Heartbeat};
use crate::queue::{RetryDecision, SendPriority, SendQueue};
use crate::state::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

enum ActorCommand {
    Send {
        priority: SendPriority,
        payload: String,
    },
    Subscribe {
        feed: String,
        bookmark: String,
        chunks: mpsc::UnboundedSender<Result<FeedChunk, NetworkError>>,
    },
    Unsubscribe {
        feed: String,
    },
}

/// A shared, reconnecting WebSocket transport. Cheap to clone — clones
/// share the same background actor and socket.
#[derive(Clone)]
pub struct WsTransport {
    commands: mpsc::UnboundedSender<ActorCommand>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    http: reqwest::Client,
    base_url: Url,
}

impl WsTransport {
    /// Connect to `base_url` (an `http(s)://` URL; translated to
    /// `ws`/`wss` for the socket), spawning the background actor that
    /// owns the connection. Reconnect backoff sleeps on [`RealClock`].
    #[must_use]
    pub fn connect(
        config: TransportConfig,
        base_url: Url,
        bearer_token: Option<String>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        Self::connect_with_clock(config, base_url, bearer_token, negotiator, Arc::new(RealClock))
    }

    /// Like [`Self::connect`], but sleeps reconnect backoff on `clock`
    /// instead of the real timer wheel — lets tests drive the exact
    /// reconnect schedule without waiting on it.
    #[must_use]
    pub fn connect_with_clock(
        config: TransportConfig,
        base_url: Url,
        bearer_token: Option<String>,
        negotiator: Arc<dyn Negotiator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shutdown = CancellationToken::new();
        let http = reqwest::Client::new();

        let actor = Actor {
            queue: SendQueue::new(config.queue_capacity, config.message_max_retries),
            subscriptions: HashMap::new(),
            router: FrameRouter::new(),
            decoder: fg_codec::GraphDecoder::new(),
            reconnect_attempts: 0,
            config,
            base_url: base_url.clone(),
            bearer_token,
            negotiator,
            clock,
            shutdown: shutdown.clone(),
            state_tx,
        };
        tokio::spawn(actor.run(command_rx));

        Self {
            commands: command_tx,
            state: state_rx,
            shutdown,
            http,
            base_url,
        }
    }

    /// The transport's current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Enqueue `payload` for delivery at `priority`.
    pub fn send(&self, priority: SendPriority, payload: String) {
        let _ = self.commands.send(ActorCommand::Send { priority, payload });
    }

    /// Begin a graceful shutdown: stop reconnecting, close the socket,
    /// and let the actor task exit.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    references: &'a [Reference],
}

#[derive(Deserialize)]
struct LoadResponse {
    facts: Vec<Envelope>,
}

#[async_trait]
impl Network for WsTransport {
    async fn load(&self, refs: &[Reference]) -> Result<Vec<Envelope>, NetworkError> {
        let url = self
            .base_url
            .join("load")
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .json(&LoadRequest { references: refs })
            .send()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NetworkError::Transport(format!(
                "load failed with status {}",
                response.status()
            )));
        }
        let body: LoadResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(body.facts)
    }

    async fn open_feed_stream(
        &self,
        feed: &str,
        bookmark: &str,
    ) -> Result<BoxStream<'static, Result<FeedChunk, NetworkError>>, NetworkError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.commands
            .send(ActorCommand::Subscribe {
                feed: feed.to_string(),
                bookmark: bookmark.to_string(),
                chunks: tx,
            })
            .map_err(|_| NetworkError::Transport("transport actor is gone".to_string()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

struct Actor {
    config: TransportConfig,
    base_url: Url,
    bearer_token: Option<String>,
    negotiator: Arc<dyn Negotiator>,
    shutdown: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    queue: SendQueue,
    subscriptions: HashMap<String, (String, mpsc::UnboundedSender<Result<FeedChunk, NetworkError>>)>,
    router: FrameRouter,
    decoder: fg_codec::GraphDecoder,
    reconnect_attempts: u32,
    clock: Arc<dyn Clock>,
}

enum ConnectionOutcome {
    Shutdown,
    Disconnected,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ActorCommand>) {
        loop {
            if self.shutdown.is_cancelled() {
                let _ = self.state_tx.send(ConnectionState::Closed);
                return;
            }

            match self.connect_once().await {
                Ok((mut sink, mut source)) => {
                    self.reconnect_attempts = 0;
                    let _ = self.state_tx.send(ConnectionState::Connected);
                    self.resubscribe_all();

                    match self.drive(&mut sink, &mut source, &mut commands).await {
                        ConnectionOutcome::Shutdown => {
                            let _ = close_gracefully(&mut sink, self.config.graceful_close_timeout).await;
                            let _ = self.state_tx.send(ConnectionState::Closed);
                            return;
                        }
                        ConnectionOutcome::Disconnected => {
                            if !self.config.stateful_reconnect {
                                self.queue.clear();
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(target: "factgraph.transport", %err, "connection attempt failed");
                }
            }

            if self.shutdown.is_cancelled() {
                let _ = self.state_tx.send(ConnectionState::Closed);
                return;
            }
            if self.config.max_reconnect_attempts != 0
                && self.reconnect_attempts >= self.config.max_reconnect_attempts
            {
                let _ = self.state_tx.send(ConnectionState::Closed);
                return;
            }

            let _ = self.state_tx.send(ConnectionState::Reconnecting);
            let delay = compute_delay(&RetryConfig::transport_reconnect(), self.reconnect_attempts);
            self.reconnect_attempts += 1;
            tokio::select! {
                () = self.clock.sleep(delay) => {}
                () = self.shutdown.cancelled() => {
                    let _ = self.state_tx.send(ConnectionState::Closed);
                    return;
                }
            }
        }
    }

    fn resubscribe_all(&mut self) {
        let frames: Vec<String> = self
            .subscriptions
            .iter()
            .map(|(feed, (bookmark, _))| {
                ControlFrame::Sub {
                    feed: feed.clone(),
                    bookmark: bookmark.clone(),
                }
                .encode()
            })
            .collect();
        for frame in frames {
            self.queue.enqueue(SendPriority::High, frame);
        }
    }

    async fn connect_once(&mut self) -> Result<(WsSink, WsSource), TransportError> {
        let _ = self.state_tx.send(ConnectionState::Connecting);
        let negotiated = tokio::time::timeout(
            self.config.connect_timeout,
            self.negotiator.negotiate(&self.base_url, self.bearer_token.as_deref()),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        let (stream, _response) = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(negotiated.url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(stream.split())
    }

    async fn drive(
        &mut self,
        sink: &mut WsSink,
        source: &mut WsSource,
        commands: &mut mpsc::UnboundedReceiver<ActorCommand>,
    ) -> ConnectionOutcome {
        let mut heartbeat = self.config.heartbeat_interval.map(tokio::time::interval);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => return ConnectionOutcome::Shutdown,

                Some(command) = commands.recv() => self.handle_command(command),

                message = source.next() => {
                    match message {
                        Some(Ok(message)) => {
                            if let Some(outcome) = self.handle_message(message) {
                                return outcome;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::warn!(target: "factgraph.transport", %err, "socket read error");
                            return ConnectionOutcome::Disconnected;
                        }
                        None => return ConnectionOutcome::Disconnected,
                    }
                }

                _ = async { heartbeat.as_mut().unwrap().tick().await }, if heartbeat.is_some() => {
                    let ping = Heartbeat::Ping { timestamp: 0 };
                    self.queue.enqueue(SendPriority::Critical, ping.encode());
                }
            }

            if let Some(outcome) = self.drain_queue(sink).await {
                return outcome;
            }
        }
    }

    fn handle_command(&mut self, command: ActorCommand) {
        match command {
            ActorCommand::Send { priority, payload } => {
                self.queue.enqueue(priority, payload);
            }
            ActorCommand::Subscribe { feed, bookmark, chunks } => {
                self.queue.enqueue(
                    SendPriority::High,
                    ControlFrame::Sub {
                        feed: feed.clone(),
                        bookmark: bookmark.clone(),
                    }
                    .encode(),
                );
                self.subscriptions.insert(feed, (bookmark, chunks));
            }
            ActorCommand::Unsubscribe { feed } => {
                self.queue
                    .enqueue(SendPriority::High, ControlFrame::Unsub { feed: feed.clone() }.encode());
                self.subscriptions.remove(&feed);
            }
        }
    }

    /// Returns `Some` if the socket should be torn down (a heartbeat
    /// message is handled here but never ends the connection).
    fn handle_message(&mut self, message: Message) -> Option<ConnectionOutcome> {
        match message {
            Message::Text(text) => {
                if Heartbeat::parse(&text).is_some() {
                    return None;
                }
                self.route_text(&text);
                None
            }
            Message::Close(_) => Some(ConnectionOutcome::Disconnected),
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => None,
        }
    }

    fn route_text(&mut self, text: &str) {
        let routed = self.router.feed(text);
        for control in routed.control_frames {
            self.apply_control_frame(control);
        }
        if !routed.graph_text.is_empty() {
            match self.decoder.decode(&routed.graph_text) {
                Ok(envelopes) => self.dispatch_graph_envelopes(envelopes),
                Err(err) => {
                    tracing::warn!(target: "factgraph.transport", %err, "dropping malformed graph frame");
                }
            }
        }
    }

    fn apply_control_frame(&mut self, frame: ControlFrame) {
        match frame {
            ControlFrame::Book { feed, bookmark } => {
                if let Some((stored, sender)) = self.subscriptions.get_mut(&feed) {
                    *stored = bookmark.clone();
                    let _ = sender.send(Ok(FeedChunk {
                        references: Vec::new(),
                        bookmark,
                    }));
                }
            }
            ControlFrame::Err { feed, message } => {
                tracing::warn!(target: "factgraph.transport", feed, message, "server reported a feed error");
            }
            ControlFrame::Sub { .. } | ControlFrame::Unsub { .. } => {
                // Client-originated keywords; a compliant server never echoes them.
            }
        }
    }

    fn dispatch_graph_envelopes(&mut self, envelopes: Vec<Envelope>) {
        // The wire format doesn't tag which feed a graph frame belongs to
        // beyond stream order: the server sends a feed's graph bytes
        // followed by that feed's BOOK frame. Until the BOOK arrives,
        // hold the references against every open subscription and let
        // the store's deduplication absorb any over-delivery — cheap and
        // correct for the common case of one feed in flight at a time.
        let references: Vec<Reference> = envelopes.iter().map(|e| e.fact.reference()).collect();
        for (_, sender) in self.subscriptions.values() {
            let _ = sender.send(Ok(FeedChunk {
                references: references.clone(),
                bookmark: String::new(),
            }));
        }
    }

    async fn drain_queue(&mut self, sink: &mut WsSink) -> Option<ConnectionOutcome> {
        while let Some(message) = self.queue.dequeue() {
            match sink.send(Message::Text(message.payload.clone().into())).await {
                Ok(()) => self.queue.confirm(message.id),
                Err(err) => {
                    tracing::warn!(target: "factgraph.transport", %err, "send failed, requeueing");
                    match self.queue.fail(message.id) {
                        RetryDecision::Immediate | RetryDecision::Delayed(_) => {}
                        RetryDecision::Dropped => {
                            tracing::warn!(target: "factgraph.transport", "dropped a message after exhausting retries");
                        }
                    }
                    return Some(ConnectionOutcome::Disconnected);
                }
            }
        }
        None
    }
}

async fn close_gracefully(sink: &mut WsSink, timeout: std::time::Duration) -> Result<(), TransportError> {
    let close = sink.send(Message::Close(None));
    tokio::time::timeout(timeout, close)
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::Network(e.to_string()))
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").field("base_url", &self.base_url).finish()
    }
}
