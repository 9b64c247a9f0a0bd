// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Feed handler for the WebCore WebSocket hub.
//!
//! The handler runs in a dedicated Tokio task and exclusively owns the
//! socket. It processes commands from the client over an unbounded channel
//! and drives the whole state machine from a single `select!` loop:
//! connection attempts, the auth gate, queue delivery, subscription
//! acknowledgments and pushes, ping/pong liveness, packet retransmission,
//! reconnect scheduling, and idle shutdown.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use ahash::AHashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::{
    auth::{AuthTracker, AuthWaiter},
    backoff::ReconnectSchedule,
    config::WebCoreWsConfig,
    error::{WebCoreWsError, WebCoreWsResult},
    messages::{
        parse_raw_frame, WsAuthRequest, WsInbound, WsInboundFrame, WsSubscribeRequest,
        WsSubscriptionPayload, WsUnsubscribeRequest,
    },
    packet::{Packet, PacketQueue, PacketResponder},
    providers::{WsAuthProvider, WsUrlProvider},
    subscription::{SubscriptionEntry, SubscriptionEvent},
};
use crate::common::{
    consts::{HANDLER_TICK_MS, WS_PING_FRAME, WS_PONG_FRAME},
    enums::{ConnectionStatus, DataOperation, SubscriptionStatus, WsGoal},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands sent from the client to the handler.
pub(crate) enum HubCommand {
    /// Ensure a connection exists; reply resolves once the socket is open.
    Connect {
        reply: Option<tokio::sync::oneshot::Sender<WebCoreWsResult<()>>>,
    },
    /// Ensure the session is authenticated.
    Authenticate { reply: Option<AuthWaiter> },
    /// Enqueue a request packet and resolve the reply with its response.
    Request {
        goal: WsGoal,
        payload: serde_json::Value,
        need_auth: bool,
        reply: PacketResponder,
    },
    /// Register a subscription.
    Subscribe { key: u64, entry: SubscriptionEntry },
    /// Tear down a subscription.
    Unsubscribe { key: u64 },
    /// The embedding application completed a login; re-run the auth gate.
    NotifyLogin,
    /// Disconnect and stop the handler.
    Disconnect,
}

/// WebCore WebSocket feed handler.
///
/// Runs in a dedicated Tokio task, processing commands and socket frames.
pub(crate) struct WsHubFeedHandler {
    config: WebCoreWsConfig,
    url_provider: Arc<dyn WsUrlProvider>,
    auth_provider: Arc<dyn WsAuthProvider>,
    signal: Arc<AtomicBool>,
    status: Arc<AtomicU8>,
    cmd_rx: tokio::sync::mpsc::UnboundedReceiver<HubCommand>,
    socket: Option<WsStream>,
    queue: PacketQueue,
    subscriptions: AHashMap<u64, SubscriptionEntry>,
    backoff: ReconnectSchedule,
    reconnect_at: Option<Instant>,
    auth_tracker: AuthTracker,
    /// Request ID and key of the auth packet in flight.
    pending_auth: Option<(u64, String)>,
    /// Key the current session authenticated with.
    authed_key: Option<String>,
    open_waiters: Vec<tokio::sync::oneshot::Sender<WebCoreWsResult<()>>>,
    /// Set after an idle shutdown or user disconnect; suppresses reconnection.
    suspended: bool,
    stopping: bool,
    last_ping_at: Instant,
    last_pong_at: Instant,
    last_activity_at: Instant,
}

impl WsHubFeedHandler {
    /// Creates a new feed handler.
    #[must_use]
    pub fn new(
        config: WebCoreWsConfig,
        url_provider: Arc<dyn WsUrlProvider>,
        auth_provider: Arc<dyn WsAuthProvider>,
        signal: Arc<AtomicBool>,
        status: Arc<AtomicU8>,
        cmd_rx: tokio::sync::mpsc::UnboundedReceiver<HubCommand>,
    ) -> Self {
        let now = Instant::now();
        let backoff = ReconnectSchedule::new(&config.reconnect_delays_ms);
        Self {
            config,
            url_provider,
            auth_provider,
            signal,
            status,
            cmd_rx,
            socket: None,
            queue: PacketQueue::new(),
            subscriptions: AHashMap::new(),
            backoff,
            reconnect_at: None,
            auth_tracker: AuthTracker::new(),
            pending_auth: None,
            authed_key: None,
            open_waiters: Vec::new(),
            suspended: false,
            stopping: false,
            last_ping_at: now,
            last_pong_at: now,
            last_activity_at: now,
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Relaxed);
    }

    fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    /// Main event loop; returns when the stop signal fires, a disconnect
    /// command arrives, or the client is dropped.
    pub async fn run(&mut self) {
        tracing::debug!("Handler task started");
        let mut tick = tokio::time::interval(Duration::from_millis(HANDLER_TICK_MS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.process_command(cmd).await,
                    None => break,
                },
                maybe_msg = Self::next_frame(&mut self.socket) => match maybe_msg {
                    Some(Ok(msg)) => self.process_socket_message(msg).await,
                    Some(Err(e)) => {
                        tracing::warn!("Socket error: {e}");
                        self.handle_disconnect("transport error").await;
                    }
                    None => self.handle_disconnect("closed by peer").await,
                },
                _ = tick.tick() => {
                    if self.signal.load(Ordering::Relaxed) {
                        break;
                    }
                    self.on_tick().await;
                }
            }

            if self.stopping {
                break;
            }
        }

        self.shutdown().await;
    }

    /// Reads the next frame, or pends forever while no socket exists.
    async fn next_frame(
        socket: &mut Option<WsStream>,
    ) -> Option<Result<Message, tungstenite::Error>> {
        match socket.as_mut() {
            Some(ws) => ws.next().await,
            None => std::future::pending().await,
        }
    }

    async fn process_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { reply } => {
                self.touch();
                self.resume_if_suspended();
                if self.status().is_open() {
                    if let Some(tx) = reply {
                        let _ = tx.send(Ok(()));
                    }
                    return;
                }
                if let Some(tx) = reply {
                    self.open_waiters.push(tx);
                }
                self.ensure_session().await;
            }
            HubCommand::Authenticate { reply } => {
                self.touch();
                self.resume_if_suspended();
                let key = self.auth_provider.api_key();
                if !self.auth_provider.is_authenticated() || key.is_none() {
                    if let Some(tx) = reply {
                        let _ = tx.send(Err(WebCoreWsError::Authentication(
                            "no credentials available".to_string(),
                        )));
                    }
                    return;
                }
                if self.status() == ConnectionStatus::OpenAndAuthenticated && self.authed_key == key
                {
                    if let Some(tx) = reply {
                        let _ = tx.send(Ok(()));
                    }
                    return;
                }
                if let Some(tx) = reply {
                    self.auth_tracker.register(tx);
                }
                self.ensure_session().await;
                if self.status().is_open() {
                    self.maybe_begin_auth().await;
                }
            }
            HubCommand::Request {
                goal,
                payload,
                need_auth,
                reply,
            } => {
                self.touch();
                self.resume_if_suspended();
                let mut body = match payload {
                    serde_json::Value::Object(map) => map,
                    serde_json::Value::Null => serde_json::Map::new(),
                    _ => {
                        let _ = reply.send(Err(WebCoreWsError::ClientError(
                            "request payload must be a JSON object".to_string(),
                        )));
                        return;
                    }
                };
                let id = self.queue.next_id();
                body.insert("id".to_string(), serde_json::json!(id));
                body.insert("goal".to_string(), serde_json::json!(goal));
                self.queue.push(Packet::new(
                    id,
                    goal,
                    serde_json::Value::Object(body),
                    need_auth,
                    Some(reply),
                ));
                tracing::debug!("Queued {goal} request {id}");
                self.ensure_session().await;
                self.flush_queue().await;
            }
            HubCommand::Subscribe { key, entry } => {
                self.touch();
                self.resume_if_suspended();
                tracing::debug!("Registered subscription {key} ({})", entry.kind);
                self.subscriptions.insert(key, entry);
                self.ensure_session().await;
                if self.status() == ConnectionStatus::OpenAndAuthenticated {
                    self.send_subscribe(key).await;
                }
            }
            HubCommand::Unsubscribe { key } => {
                self.touch();
                self.handle_unsubscribe(key).await;
            }
            HubCommand::NotifyLogin => {
                self.touch();
                tracing::debug!("Login notification received");
                self.resume_if_suspended();
                if self.status().is_open() {
                    self.maybe_begin_auth().await;
                }
            }
            HubCommand::Disconnect => {
                tracing::debug!("Disconnect requested");
                self.stopping = true;
            }
        }
    }

    async fn process_socket_message(&mut self, msg: Message) {
        match msg {
            Message::Text(text) => self.process_text(text.as_str()).await,
            Message::Ping(data) => {
                if let Some(ws) = self.socket.as_mut() {
                    let _ = ws.send(Message::Pong(data)).await;
                }
            }
            Message::Close(_) => {
                tracing::info!("Received close frame");
                self.handle_disconnect("closed by server").await;
            }
            _ => {}
        }
    }

    async fn process_text(&mut self, text: &str) {
        match parse_raw_frame(text) {
            Ok(WsInbound::Ping) => {
                tracing::trace!("Ping received");
                if let Err(e) = self.send_text(WS_PONG_FRAME.to_string()).await {
                    tracing::warn!("Pong reply failed: {e}");
                    self.handle_disconnect("send failure").await;
                }
            }
            Ok(WsInbound::Pong) => {
                tracing::trace!("Pong received");
                self.last_pong_at = Instant::now();
            }
            Ok(WsInbound::Frame { frame, raw }) => self.process_frame(*frame, raw).await,
            Err(e) => tracing::warn!("Discarding malformed frame: {e}"),
        }
    }

    async fn process_frame(&mut self, frame: WsInboundFrame, raw: serde_json::Value) {
        self.touch();
        match frame.goal {
            WsGoal::Auth => self.handle_auth_response(&frame).await,
            WsGoal::Subscribe => self.handle_subscribe_response(&frame),
            WsGoal::Unsubscribe => self.handle_unsubscribe_response(&frame),
            WsGoal::Data => self.handle_data_frame(&frame, raw),
            _ => self.handle_request_response(&frame, raw),
        }
    }

    async fn handle_auth_response(&mut self, frame: &WsInboundFrame) {
        let _ = self.queue.complete(frame.id, WsGoal::Auth);
        let Some((pending_id, key)) = self.pending_auth.take() else {
            tracing::warn!("Unsolicited auth response (request {})", frame.id);
            return;
        };
        if pending_id != frame.id {
            // Stale response from a superseded auth attempt
            tracing::debug!("Ignoring stale auth response (request {})", frame.id);
            self.pending_auth = Some((pending_id, key));
            return;
        }
        if frame.is_success() {
            tracing::info!("Authentication successful");
            self.authed_key = Some(key);
            self.set_status(ConnectionStatus::OpenAndAuthenticated);
            self.auth_tracker.succeed();
            self.resubscribe_inactive().await;
            self.flush_queue().await;
        } else {
            tracing::error!("Authentication rejected: {}", frame.error_message());
            // Session stays Open and waiters stay registered; a later gate
            // run (fresh credentials, reconnect) resolves them
        }
    }

    fn handle_subscribe_response(&mut self, frame: &WsInboundFrame) {
        let _ = self.queue.complete(frame.id, WsGoal::Subscribe);
        let key = self
            .subscriptions
            .iter()
            .find(|(_, e)| e.request_id == Some(frame.id))
            .map(|(k, _)| *k);
        let Some(key) = key else {
            tracing::warn!("Subscribe response for unknown request {}", frame.id);
            return;
        };
        let Some(entry) = self.subscriptions.get_mut(&key) else {
            return;
        };
        if frame.is_success() {
            match frame.subscription_id {
                Some(server_id) => {
                    entry.mark_active(server_id);
                    tracing::debug!("Subscription {key} active (subscriptionId {server_id})");
                }
                None => {
                    tracing::warn!(
                        "Subscribe response missing subscriptionId (request {})",
                        frame.id
                    );
                    entry.mark_inactive();
                    entry.emit(SubscriptionEvent::Error {
                        code: -1,
                        message: "missing subscriptionId".to_string(),
                    });
                }
            }
        } else {
            let code = frame.result_code.unwrap_or(-1);
            let message = frame.error_message();
            tracing::error!("Subscribe rejected {code}: {message}");
            entry.mark_inactive();
            entry.emit(SubscriptionEvent::Error { code, message });
        }
    }

    fn handle_unsubscribe_response(&mut self, frame: &WsInboundFrame) {
        let _ = self.queue.complete(frame.id, WsGoal::Unsubscribe);
        let key = self
            .subscriptions
            .iter()
            .find(|(_, e)| e.request_id == Some(frame.id))
            .map(|(k, _)| *k);
        match key {
            Some(key) => {
                self.subscriptions.remove(&key);
                if frame.is_success() {
                    tracing::debug!("Subscription {key} removed");
                } else {
                    // Cancellation is terminal locally regardless
                    tracing::warn!(
                        "Unsubscribe rejected for subscription {key}: {}",
                        frame.error_message()
                    );
                }
            }
            None => tracing::warn!("Unsubscribe response for unknown request {}", frame.id),
        }
    }

    fn handle_data_frame(&mut self, frame: &WsInboundFrame, raw: serde_json::Value) {
        // Prefer the server subscription ID; fall back to the subscribe
        // request ID for pushes that do not carry one
        let key = frame
            .subscription_id
            .and_then(|sid| {
                self.subscriptions
                    .iter()
                    .find(|(_, e)| e.server_id == Some(sid))
                    .map(|(k, _)| *k)
            })
            .or_else(|| {
                self.subscriptions
                    .iter()
                    .find(|(_, e)| e.request_id == Some(frame.id))
                    .map(|(k, _)| *k)
            });

        if let Some(key) = key {
            let Some(entry) = self.subscriptions.get(&key) else {
                return;
            };
            let Some(data) = &frame.data else {
                tracing::warn!("Data frame without envelope for subscription {key}");
                return;
            };
            if !entry.operations.contains(data.operation) {
                tracing::warn!("Unrequested {} push for subscription {key}", data.operation);
                return;
            }
            let payload = data.payload.clone();
            let event = match data.operation {
                DataOperation::Create => SubscriptionEvent::Create(payload),
                DataOperation::Update => SubscriptionEvent::Update(payload),
                DataOperation::Delete => SubscriptionEvent::Delete(payload),
            };
            entry.emit(event);
            return;
        }

        // Not a push: maybe the response to a queued data-plane request
        if let Some(packet) = self.queue.complete(frame.id, WsGoal::Data) {
            Self::finish_request(packet, frame, raw);
            return;
        }
        tracing::warn!("Data frame for unknown subscription (request {})", frame.id);
    }

    fn handle_request_response(&mut self, frame: &WsInboundFrame, raw: serde_json::Value) {
        match self.queue.complete(frame.id, frame.goal) {
            Some(packet) => Self::finish_request(packet, frame, raw),
            None => tracing::warn!("Unmatched {} response (request {})", frame.goal, frame.id),
        }
    }

    fn finish_request(packet: Packet, frame: &WsInboundFrame, raw: serde_json::Value) {
        let elapsed = packet.created_at.elapsed();
        if frame.is_success() {
            tracing::debug!(
                "Request {} completed in {elapsed:?} ({} attempts)",
                frame.id,
                packet.attempts
            );
            packet.resolve(raw);
        } else {
            let code = frame.result_code.unwrap_or(-1);
            let message = frame.error_message();
            tracing::debug!("Request {} failed with {code}: {message}", frame.id);
            packet.reject(WebCoreWsError::ServerError { code, message });
        }
    }

    /// Connects if disconnected and no reconnect is already scheduled.
    async fn ensure_session(&mut self) {
        if self.stopping || self.suspended {
            return;
        }
        if self.status() == ConnectionStatus::Disconnected && self.reconnect_at.is_none() {
            self.try_connect().await;
        }
    }

    async fn try_connect(&mut self) {
        self.reconnect_at = None;
        self.set_status(ConnectionStatus::Connecting);

        let url = match self.url_provider.websocket_url().await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("URL resolution failed: {e}");
                self.connect_failed();
                return;
            }
        };

        tracing::debug!("Connecting to {url}");
        match tokio::time::timeout(self.config.connect_timeout(), connect_async(&url)).await {
            Ok(Ok((socket, _response))) => {
                tracing::info!("Connected to {url}");
                self.socket = Some(socket);
                self.set_status(ConnectionStatus::Open);
                self.backoff.reset();
                let now = Instant::now();
                self.last_ping_at = now;
                self.last_pong_at = now;
                self.touch();
                for tx in self.open_waiters.drain(..) {
                    let _ = tx.send(Ok(()));
                }
                self.maybe_begin_auth().await;
                self.flush_queue().await;
            }
            Ok(Err(e)) => {
                tracing::warn!("Connection failed: {e}");
                self.connect_failed();
            }
            Err(_) => {
                tracing::warn!(
                    "Connection attempt timed out after {:?}",
                    self.config.connect_timeout()
                );
                self.connect_failed();
            }
        }
    }

    fn connect_failed(&mut self) {
        self.set_status(ConnectionStatus::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.stopping || self.suspended {
            return;
        }
        let delay = self.backoff.next_delay();
        tracing::debug!(
            "Reconnect attempt {} scheduled in {delay:?}",
            self.backoff.attempts()
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn handle_disconnect(&mut self, reason: &str) {
        if self.socket.is_none() && self.status() == ConnectionStatus::Disconnected {
            return;
        }
        tracing::warn!("Disconnected: {reason}");
        if let Some(mut ws) = self.socket.take() {
            let _ = ws.close(None).await;
        }
        self.set_status(ConnectionStatus::Disconnected);
        self.authed_key = None;
        self.pending_auth = None;

        let rejected = self.queue.reject_control();
        if rejected > 0 {
            tracing::debug!("Rejected {rejected} control packets");
        }
        // A cancelled entry's in-flight unsubscribe died with the session;
        // nothing replays it, so the entry is dropped here
        self.subscriptions.retain(|_, entry| {
            entry.reset_for_reconnect();
            entry.status() != SubscriptionStatus::Cancelled
        });
        self.schedule_reconnect();
    }

    /// Runs the auth gate: sends an auth packet when credentials exist and
    /// the session is not already authenticated with the same key.
    async fn maybe_begin_auth(&mut self) {
        if !self.status().is_open() {
            return;
        }
        if !self.auth_provider.is_authenticated() {
            tracing::debug!("No authenticated user, staying unauthenticated");
            return;
        }
        let Some(key) = self.auth_provider.api_key() else {
            tracing::debug!("No API key available, staying unauthenticated");
            return;
        };
        if self.status() == ConnectionStatus::OpenAndAuthenticated
            && self.authed_key.as_deref() == Some(key.as_str())
        {
            self.auth_tracker.succeed();
            return;
        }
        if let Some((_, pending_key)) = &self.pending_auth {
            if pending_key == &key {
                return;
            }
        }

        let id = self.queue.next_id();
        let request = WsAuthRequest::new(id, key.clone());
        match serde_json::to_value(&request) {
            Ok(payload) => {
                tracing::debug!("Authenticating (request {id})");
                self.pending_auth = Some((id, key));
                self.queue
                    .push(Packet::new(id, WsGoal::Auth, payload, false, None));
                self.flush_queue().await;
            }
            Err(e) => tracing::error!("Failed to serialize auth request: {e}"),
        }
    }

    /// Writes every due packet whose auth gate is satisfied.
    async fn flush_queue(&mut self) {
        if self.socket.is_none() {
            return;
        }
        let authenticated = self.status() == ConnectionStatus::OpenAndAuthenticated;
        let now = Instant::now();

        let mut frames = Vec::new();
        for packet in self.queue.pending_mut(authenticated) {
            match serde_json::to_string(&packet.payload) {
                Ok(text) => {
                    packet.sent_at = Some(now);
                    packet.attempts += 1;
                    frames.push(text);
                }
                Err(e) => tracing::error!("Failed to serialize packet {}: {e}", packet.id),
            }
        }

        for text in frames {
            if let Err(e) = self.send_text(text).await {
                tracing::warn!("Send failed: {e}");
                self.handle_disconnect("send failure").await;
                return;
            }
        }
    }

    async fn send_text(&mut self, text: String) -> WebCoreWsResult<()> {
        match self.socket.as_mut() {
            Some(ws) => ws
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| WebCoreWsError::Send(e.to_string())),
            None => Err(WebCoreWsError::NotConnected),
        }
    }

    async fn send_subscribe(&mut self, key: u64) {
        let Some(entry) = self.subscriptions.get(&key) else {
            return;
        };
        if entry.status() == SubscriptionStatus::Cancelled {
            return;
        }
        let payload = WsSubscriptionPayload {
            kind: entry.kind,
            operation: entry.operations,
            params: entry.params.clone(),
        };

        let id = self.queue.next_id();
        if let Some(entry) = self.subscriptions.get_mut(&key) {
            entry.mark_pending(id);
        }
        let request = WsSubscribeRequest::new(id, payload);
        match serde_json::to_value(&request) {
            Ok(frame) => {
                tracing::debug!("Subscribing {key} (request {id})");
                self.queue
                    .push(Packet::new(id, WsGoal::Subscribe, frame, true, None));
                self.flush_queue().await;
            }
            Err(e) => tracing::error!("Failed to serialize subscribe request: {e}"),
        }
    }

    /// Re-subscribes every inactive entry after a successful authentication.
    async fn resubscribe_inactive(&mut self) {
        let keys: Vec<u64> = self
            .subscriptions
            .iter()
            .filter(|(_, e)| e.status() == SubscriptionStatus::Inactive)
            .map(|(k, _)| *k)
            .collect();
        if keys.is_empty() {
            return;
        }
        tracing::info!("Re-subscribing {} subscriptions", keys.len());
        for key in keys {
            self.send_subscribe(key).await;
        }
    }

    async fn handle_unsubscribe(&mut self, key: u64) {
        let Some(entry) = self.subscriptions.get_mut(&key) else {
            return;
        };
        if entry.status() == SubscriptionStatus::Cancelled {
            return;
        }
        entry.cancel();
        let server_id = entry.server_id;

        match server_id {
            Some(server_id) if self.status().is_open() => {
                let id = self.queue.next_id();
                if let Some(entry) = self.subscriptions.get_mut(&key) {
                    entry.request_id = Some(id);
                }
                let request = WsUnsubscribeRequest::new(id, server_id);
                match serde_json::to_value(&request) {
                    Ok(frame) => {
                        tracing::debug!(
                            "Unsubscribing {key} (request {id}, subscriptionId {server_id})"
                        );
                        self.queue
                            .push(Packet::new(id, WsGoal::Unsubscribe, frame, true, None));
                        self.flush_queue().await;
                    }
                    Err(e) => tracing::error!("Failed to serialize unsubscribe request: {e}"),
                }
            }
            _ => {
                // Never reached the server in this session; drop locally
                self.subscriptions.remove(&key);
                tracing::debug!("Subscription {key} cancelled locally");
            }
        }
    }

    fn has_live_subscriptions(&self) -> bool {
        self.subscriptions
            .values()
            .any(|e| e.status() != SubscriptionStatus::Cancelled)
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();

        if self.reconnect_at.is_some_and(|due| now >= due) {
            self.try_connect().await;
            return;
        }

        let expired = self.queue.expire_stale(self.config.request_timeout(), now);
        if expired > 0 {
            tracing::debug!("{expired} packets timed out, retransmitting");
            self.flush_queue().await;
        }

        if self.socket.is_none() {
            return;
        }

        if now.duration_since(self.last_pong_at) >= self.config.pong_timeout() {
            tracing::warn!(
                "No pong within {:?}, forcing reconnect",
                self.config.pong_timeout()
            );
            self.handle_disconnect("pong timeout").await;
            return;
        }

        if now.duration_since(self.last_ping_at) >= self.config.ping_interval() {
            self.last_ping_at = now;
            tracing::trace!("Sending ping");
            if let Err(e) = self.send_text(WS_PING_FRAME.to_string()).await {
                tracing::warn!("Ping failed: {e}");
                self.handle_disconnect("send failure").await;
                return;
            }
        }

        if self.queue.is_empty()
            && !self.has_live_subscriptions()
            && now.duration_since(self.last_activity_at) >= self.config.idle_timeout()
        {
            tracing::info!(
                "Idle for {:?}, closing connection",
                self.config.idle_timeout()
            );
            self.suspend().await;
        }
    }

    /// Closes voluntarily without scheduling a reconnect; the next command
    /// resumes with a fresh backoff schedule.
    async fn suspend(&mut self) {
        self.suspended = true;
        self.reconnect_at = None;
        if let Some(mut ws) = self.socket.take() {
            let _ = ws.close(None).await;
        }
        self.set_status(ConnectionStatus::Disconnected);
        self.authed_key = None;
        self.pending_auth = None;
        for tx in self.open_waiters.drain(..) {
            let _ = tx.send(Err(WebCoreWsError::ConnectionTerminated));
        }
    }

    fn resume_if_suspended(&mut self) {
        if self.suspended {
            tracing::debug!("Resuming after idle shutdown");
            self.suspended = false;
            self.backoff.reset();
        }
    }

    async fn shutdown(&mut self) {
        tracing::debug!("Handler task stopping");
        if let Some(mut ws) = self.socket.take() {
            let _ = ws.close(None).await;
        }
        self.set_status(ConnectionStatus::Disconnected);
        self.queue.reject_all(&WebCoreWsError::ConnectionTerminated);
        for tx in self.open_waiters.drain(..) {
            let _ = tx.send(Err(WebCoreWsError::ConnectionTerminated));
        }
        self.auth_tracker.fail("client closed");
        for entry in self.subscriptions.values_mut() {
            entry.reset_for_reconnect();
        }
    }
}
