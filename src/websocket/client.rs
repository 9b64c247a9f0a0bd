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

//! WebCore WebSocket hub client.
//!
//! [`WebCoreWsHub`] is the public face of the hub: it spawns the feed handler
//! on a dedicated Tokio task and communicates with it over an unbounded
//! command channel. All methods are cheap and safe to call from any task.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::{
    config::WebCoreWsConfig,
    error::{WebCoreWsError, WebCoreWsResult},
    handler::{HubCommand, WsHubFeedHandler},
    providers::{WsAuthProvider, WsUrlProvider},
    subscription::{
        OperationMask, SubscriptionEntry, SubscriptionKind, SubscriptionSharedState,
        WebCoreSubscription,
    },
};
use crate::common::enums::{ConnectionStatus, SubscriptionStatus, WsGoal};

/// Capacity of each subscription's event fan-out channel.
const SUBSCRIPTION_EVENT_CAPACITY: usize = 1024;

/// Timeout for joining the handler task on close.
const CLOSE_TIMEOUT_SECS: u64 = 5;

/// Client for the WebCore WebSocket hub.
///
/// One instance owns one channel to the platform; all request/response and
/// publish/subscribe traffic multiplexes over it. The hub connects lazily:
/// the first command needing a session triggers the connection attempt, and
/// reconnection, authentication, and subscription replay happen internally.
pub struct WebCoreWsHub {
    config: WebCoreWsConfig,
    status: Arc<AtomicU8>,
    signal: Arc<AtomicBool>,
    cmd_tx: mpsc::UnboundedSender<HubCommand>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    subscription_states: Arc<DashMap<u64, Arc<SubscriptionSharedState>>>,
    subscription_key_counter: AtomicU64,
}

impl std::fmt::Debug for WebCoreWsHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(WebCoreWsHub))
            .field("config", &self.config)
            .field("status", &self.connection_status())
            .finish()
    }
}

impl WebCoreWsHub {
    /// Creates a new [`WebCoreWsHub`] and spawns its handler task.
    ///
    /// Must be called from within a Tokio runtime. No connection is attempted
    /// until the first command needs one (or [`Self::connect`] is called).
    #[must_use]
    pub fn new(
        config: WebCoreWsConfig,
        url_provider: Arc<dyn WsUrlProvider>,
        auth_provider: Arc<dyn WsAuthProvider>,
    ) -> Self {
        let status = Arc::new(AtomicU8::new(ConnectionStatus::Disconnected as u8));
        let signal = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let mut handler = WsHubFeedHandler::new(
            config.clone(),
            url_provider,
            auth_provider,
            signal.clone(),
            status.clone(),
            cmd_rx,
        );
        let task = tokio::spawn(async move { handler.run().await });

        Self {
            config,
            status,
            signal,
            cmd_tx,
            task: Mutex::new(Some(task)),
            subscription_states: Arc::new(DashMap::new()),
            subscription_key_counter: AtomicU64::new(1),
        }
    }

    /// Returns the configuration the hub was created with.
    #[must_use]
    pub const fn config(&self) -> &WebCoreWsConfig {
        &self.config
    }

    /// Returns the current connection status.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Returns whether a socket is established.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.connection_status().is_open()
    }

    /// Returns whether the session is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.connection_status() == ConnectionStatus::OpenAndAuthenticated
    }

    /// Returns the number of currently active subscriptions.
    #[must_use]
    pub fn active_subscription_count(&self) -> usize {
        self.subscription_states
            .iter()
            .filter(|entry| entry.value().status() == SubscriptionStatus::Active)
            .count()
    }

    fn send_cmd(&self, cmd: HubCommand) -> WebCoreWsResult<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| WebCoreWsError::ClientError("handler task stopped".to_string()))
    }

    /// Ensures a connection exists, resolving once the socket is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub is closing or the handler task stopped.
    pub async fn connect(&self) -> WebCoreWsResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(HubCommand::Connect { reply: Some(tx) })?;
        rx.await
            .map_err(|_| WebCoreWsError::ConnectionTerminated)?
    }

    /// Ensures the session is authenticated, connecting first if needed.
    ///
    /// Idempotent: resolves immediately when already authenticated with the
    /// current key.
    ///
    /// # Errors
    ///
    /// Returns an error if no credentials are available or the platform
    /// rejects them (the connection stays open in that case).
    pub async fn ensure_authenticated(&self) -> WebCoreWsResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(HubCommand::Authenticate { reply: Some(tx) })?;
        rx.await
            .map_err(|_| WebCoreWsError::ConnectionTerminated)?
    }

    /// Waits until a socket is established, polling the shared status.
    ///
    /// # Errors
    ///
    /// Returns a timeout error if the hub is not active within `timeout_secs`.
    pub async fn wait_until_active(&self, timeout_secs: f64) -> WebCoreWsResult<()> {
        let timeout = Duration::from_secs_f64(timeout_secs);
        let check = async {
            while !self.is_active() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, check)
            .await
            .map_err(|_| WebCoreWsError::Timeout(format!("not active within {timeout_secs}s")))
    }

    /// Sends a request over the hub and awaits its correlated response.
    ///
    /// The payload must be a JSON object (or `null`); `id` and `goal` are
    /// filled in by the hub. Delivery waits for an authenticated session and
    /// survives reconnects for data-plane goals; the returned future resolves
    /// with the full response frame on `resultCode == 0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an object, the goal is one the
    /// hub manages internally (auth/subscribe/unsubscribe), the platform
    /// responds with a non-zero `resultCode`, or the connection is torn down
    /// while a control-goal request is in flight.
    pub async fn request(
        &self,
        goal: WsGoal,
        payload: serde_json::Value,
    ) -> WebCoreWsResult<serde_json::Value> {
        self.request_with(goal, payload, true).await
    }

    /// Sends a request that does not wait for authentication.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request`].
    pub async fn request_no_auth(
        &self,
        goal: WsGoal,
        payload: serde_json::Value,
    ) -> WebCoreWsResult<serde_json::Value> {
        self.request_with(goal, payload, false).await
    }

    async fn request_with(
        &self,
        goal: WsGoal,
        payload: serde_json::Value,
        need_auth: bool,
    ) -> WebCoreWsResult<serde_json::Value> {
        // Responses for these goals route to the auth gate and the
        // subscription registry, never back to a caller
        if matches!(goal, WsGoal::Auth | WsGoal::Subscribe | WsGoal::Unsubscribe) {
            return Err(WebCoreWsError::ClientError(format!(
                "goal '{goal}' is managed by the hub"
            )));
        }
        let (tx, rx) = oneshot::channel();
        self.send_cmd(HubCommand::Request {
            goal,
            payload,
            need_auth,
            reply: tx,
        })?;
        rx.await
            .map_err(|_| WebCoreWsError::ConnectionTerminated)?
    }

    /// Registers a subscription and returns its handle.
    ///
    /// The subscription activates asynchronously once the session is
    /// authenticated and re-activates after every reconnect until
    /// [`WebCoreSubscription::unsubscribe`] is called. Track progress via
    /// [`WebCoreSubscription::status`] and consume pushes via
    /// [`WebCoreSubscription::events`] or [`WebCoreSubscription::stream`].
    ///
    /// # Errors
    ///
    /// Returns an error if `params` is not a JSON object (or `null`), or the
    /// handler task stopped.
    pub fn subscribe(
        &self,
        kind: SubscriptionKind,
        operations: OperationMask,
        params: serde_json::Value,
    ) -> WebCoreWsResult<WebCoreSubscription> {
        let params = match params {
            serde_json::Value::Object(_) => params,
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            _ => {
                return Err(WebCoreWsError::ClientError(
                    "subscription params must be a JSON object".to_string(),
                ))
            }
        };

        let key = self.subscription_key_counter.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(SubscriptionSharedState::new());
        let (events_tx, _keepalive) = broadcast::channel(SUBSCRIPTION_EVENT_CAPACITY);

        let entry = SubscriptionEntry::new(
            kind,
            operations,
            params,
            state.clone(),
            events_tx.clone(),
        );
        self.subscription_states.insert(key, state.clone());
        self.send_cmd(HubCommand::Subscribe { key, entry })?;

        Ok(WebCoreSubscription::new(
            key,
            kind,
            operations,
            state,
            events_tx,
            self.subscription_states.clone(),
            self.cmd_tx.clone(),
        ))
    }

    /// Notifies the hub that the embedding application completed a login,
    /// re-running the auth gate with the provider's current key.
    pub fn notify_login(&self) {
        let _ = self.cmd_tx.send(HubCommand::NotifyLogin);
    }

    /// Closes the hub: disconnects without reconnection and joins the
    /// handler task.
    pub async fn close(&self) {
        tracing::debug!("Closing hub");
        self.signal.store(true, Ordering::Relaxed);
        let _ = self.cmd_tx.send(HubCommand::Disconnect);

        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            match tokio::time::timeout(Duration::from_secs(CLOSE_TIMEOUT_SECS), task).await {
                Ok(_) => tracing::debug!("Handler task finished"),
                Err(_) => tracing::warn!("Handler task did not finish in time"),
            }
        }
    }
}

impl Drop for WebCoreWsHub {
    fn drop(&mut self) {
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}
