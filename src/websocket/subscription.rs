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

//! Subscription types and the client-side subscription handle.
//!
//! Subscriptions are tracked by a stable client-side key, independent of the
//! wire request ID which changes on every re-subscribe. Events fan out over a
//! broadcast channel so one slow consumer cannot affect the others.

use std::{
    ops::BitOr,
    sync::{
        atomic::{AtomicU8, AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::broadcast;

use super::handler::HubCommand;
use crate::common::enums::{DataOperation, SubscriptionStatus};

/// Mask of mutation kinds a subscription wants pushed, as encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationMask(u8);

impl OperationMask {
    /// Creation pushes.
    pub const CREATE: Self = Self(1);
    /// Update pushes.
    pub const UPDATE: Self = Self(2);
    /// Deletion pushes.
    pub const DELETE: Self = Self(4);
    /// All mutation kinds.
    pub const ALL: Self = Self(7);

    /// Returns the raw wire encoding.
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns whether the mask includes the given mutation kind.
    #[must_use]
    pub const fn contains(&self, operation: DataOperation) -> bool {
        let bit = match operation {
            DataOperation::Create => Self::CREATE.0,
            DataOperation::Update => Self::UPDATE.0,
            DataOperation::Delete => Self::DELETE.0,
        };
        self.0 & bit != 0
    }
}

impl BitOr for OperationMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Domain discriminator of a subscription, as encoded in the wire `type` field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionKind {
    /// Runtime state of locations.
    LocationStates,
    /// Runtime state of devices.
    DeviceStates,
    /// Location entities.
    Locations,
    /// Device entities.
    Devices,
    /// Automation rules.
    Rules,
}

/// An event delivered on a subscription.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// An entity in scope was created.
    Create(serde_json::Value),
    /// An entity in scope was updated.
    Update(serde_json::Value),
    /// An entity in scope was deleted.
    Delete(serde_json::Value),
    /// The platform rejected the subscription.
    Error {
        /// Result code from the platform.
        code: i64,
        /// Failure message.
        message: String,
    },
}

/// Subscription state shared between the handler task and the client handle.
#[derive(Debug, Default)]
pub struct SubscriptionSharedState {
    status: AtomicU8,
    subscription_id: AtomicU64, // 0 = none
}

impl SubscriptionSharedState {
    /// Creates a new state in `Inactive`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Updates the lifecycle status.
    pub fn set_status(&self, status: SubscriptionStatus) {
        self.status.store(status as u8, Ordering::Relaxed);
    }

    /// Returns the server-assigned subscription ID, if active.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u64> {
        match self.subscription_id.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    /// Stores or clears the server-assigned subscription ID.
    pub fn set_subscription_id(&self, id: Option<u64>) {
        self.subscription_id.store(id.unwrap_or(0), Ordering::Relaxed);
    }
}

/// Handler-side registry entry for a subscription.
#[derive(Debug)]
pub(crate) struct SubscriptionEntry {
    pub kind: SubscriptionKind,
    pub operations: OperationMask,
    pub params: serde_json::Value,
    /// ID of the most recent subscribe/unsubscribe request for this entry.
    pub request_id: Option<u64>,
    /// Server-assigned subscription ID while active.
    pub server_id: Option<u64>,
    pub state: Arc<SubscriptionSharedState>,
    pub events: broadcast::Sender<SubscriptionEvent>,
}

impl SubscriptionEntry {
    pub fn new(
        kind: SubscriptionKind,
        operations: OperationMask,
        params: serde_json::Value,
        state: Arc<SubscriptionSharedState>,
        events: broadcast::Sender<SubscriptionEvent>,
    ) -> Self {
        Self {
            kind,
            operations,
            params,
            request_id: None,
            server_id: None,
            state,
            events,
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.state.status()
    }

    /// Marks the subscribe request as in flight.
    pub fn mark_pending(&mut self, request_id: u64) {
        self.request_id = Some(request_id);
        self.server_id = None;
        self.state.set_subscription_id(None);
        self.state.set_status(SubscriptionStatus::Pending);
    }

    /// Marks the subscription acknowledged by the server.
    pub fn mark_active(&mut self, server_id: u64) {
        self.server_id = Some(server_id);
        self.state.set_subscription_id(Some(server_id));
        self.state.set_status(SubscriptionStatus::Active);
    }

    /// Reverts to `Inactive` (rejected subscribe, or lost connection).
    pub fn mark_inactive(&mut self) {
        self.request_id = None;
        self.server_id = None;
        self.state.set_subscription_id(None);
        self.state.set_status(SubscriptionStatus::Inactive);
    }

    /// Reverts a non-cancelled entry to `Inactive` so the next authenticated
    /// session re-subscribes it.
    pub fn reset_for_reconnect(&mut self) {
        if self.status() != SubscriptionStatus::Cancelled {
            self.mark_inactive();
        }
    }

    /// Terminally cancels the entry.
    pub fn cancel(&mut self) {
        self.state.set_status(SubscriptionStatus::Cancelled);
    }

    /// Emits an event to all attached receivers (no-op when none are attached).
    pub fn emit(&self, event: SubscriptionEvent) {
        let _ = self.events.send(event);
    }
}

/// Client-side handle to a subscription.
///
/// Dropping the handle does not cancel the subscription; call
/// [`WebCoreSubscription::unsubscribe`] to tear it down on the server.
#[derive(Debug)]
pub struct WebCoreSubscription {
    key: u64,
    kind: SubscriptionKind,
    operations: OperationMask,
    state: Arc<SubscriptionSharedState>,
    events: broadcast::Sender<SubscriptionEvent>,
    registry: Arc<DashMap<u64, Arc<SubscriptionSharedState>>>,
    cmd_tx: tokio::sync::mpsc::UnboundedSender<HubCommand>,
}

impl WebCoreSubscription {
    pub(crate) fn new(
        key: u64,
        kind: SubscriptionKind,
        operations: OperationMask,
        state: Arc<SubscriptionSharedState>,
        events: broadcast::Sender<SubscriptionEvent>,
        registry: Arc<DashMap<u64, Arc<SubscriptionSharedState>>>,
        cmd_tx: tokio::sync::mpsc::UnboundedSender<HubCommand>,
    ) -> Self {
        Self {
            key,
            kind,
            operations,
            state,
            events,
            registry,
            cmd_tx,
        }
    }

    /// Returns the subscription kind.
    #[must_use]
    pub const fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Returns the requested operation mask.
    #[must_use]
    pub const fn operations(&self) -> OperationMask {
        self.operations
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SubscriptionStatus {
        self.state.status()
    }

    /// Returns whether the subscription is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == SubscriptionStatus::Active
    }

    /// Returns the server-assigned subscription ID, if active.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u64> {
        self.state.subscription_id()
    }

    /// Returns a new event receiver.
    ///
    /// Each receiver observes events independently; only events sent after
    /// this call are delivered.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.events.subscribe()
    }

    /// Returns a stream of subscription events.
    ///
    /// A lagging consumer skips the overwritten events with a warning rather
    /// than stalling other receivers.
    pub fn stream(&self) -> impl Stream<Item = SubscriptionEvent> + 'static {
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Subscription stream lagged, {skipped} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Requests teardown of the subscription on the server and terminally
    /// cancels it locally, dropping it from the hub's registry.
    pub fn unsubscribe(&self) {
        self.registry.remove(&self.key);
        let _ = self.cmd_tx.send(HubCommand::Unsubscribe { key: self.key });
    }
}
