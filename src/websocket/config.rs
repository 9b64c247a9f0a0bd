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

//! Configuration for the WebCore WebSocket hub.
//!
//! Every timer the hub runs on is tunable here: the reconnect delay schedule,
//! the ping cadence and pong liveness window, the idle shutdown window, and
//! the soft per-packet retransmission timeout. Defaults match the platform's
//! documented behavior.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::consts::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_PING_INTERVAL_MS,
    DEFAULT_PONG_TIMEOUT_MS, DEFAULT_RECONNECT_DELAYS_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Configuration for the WebCore WebSocket hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebCoreWsConfig {
    /// Reconnect delay schedule in milliseconds.
    ///
    /// Attempt N uses entry N, saturating at the last entry. The schedule
    /// resets after every successful open.
    pub reconnect_delays_ms: Vec<u64>,
    /// Interval between outbound `"?"` ping frames in milliseconds.
    pub ping_interval_ms: u64,
    /// Hard liveness timeout in milliseconds: if no `"!"` pong arrives within
    /// this window the socket is force-closed and reconnection starts.
    pub pong_timeout_ms: u64,
    /// Idle window in milliseconds: with an empty queue, no live
    /// subscriptions, and no traffic for this long, the hub closes
    /// voluntarily and does not reconnect until new work arrives.
    pub idle_timeout_ms: u64,
    /// Soft per-packet timeout in milliseconds: an unanswered packet has its
    /// sent mark cleared so it retransmits on the next delivery pass.
    pub request_timeout_ms: u64,
    /// Timeout in milliseconds for establishing a single connection attempt.
    pub connect_timeout_ms: u64,
}

impl Default for WebCoreWsConfig {
    fn default() -> Self {
        Self {
            reconnect_delays_ms: DEFAULT_RECONNECT_DELAYS_MS.to_vec(),
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            pong_timeout_ms: DEFAULT_PONG_TIMEOUT_MS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl WebCoreWsConfig {
    /// Returns the ping interval as a [`Duration`].
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Returns the pong liveness timeout as a [`Duration`].
    #[must_use]
    pub const fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    /// Returns the idle shutdown window as a [`Duration`].
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Returns the soft per-packet timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
