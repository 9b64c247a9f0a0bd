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

//! WebSocket hub for the [WebCore](https://webcore.cloud) IoT cloud platform.
//!
//! The hub maintains a single long-lived WebSocket channel to the platform and
//! multiplexes all request/response and publish/subscribe traffic over it:
//!
//! - Automatic reconnection with a fixed backoff schedule.
//! - Authentication gating: packets requiring auth are held until the session
//!   is authenticated, and subscriptions are replayed after every reconnect.
//! - A send queue that survives reconnects for data-plane packets.
//! - Application-level ping/pong liveness and idle-timeout shutdown.
//!
//! The main entry point is [`websocket::client::WebCoreWsHub`].

pub mod common;
pub mod websocket;

pub use crate::{
    common::enums::{ConnectionStatus, DataOperation, SubscriptionStatus, WsGoal},
    websocket::{
        client::WebCoreWsHub,
        config::WebCoreWsConfig,
        error::{WebCoreWsError, WebCoreWsResult},
        providers::{StaticAuthProvider, StaticUrlProvider, WsAuthProvider, WsUrlProvider},
        subscription::{OperationMask, SubscriptionEvent, SubscriptionKind, WebCoreSubscription},
    },
};
