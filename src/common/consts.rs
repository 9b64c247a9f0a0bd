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

//! Protocol constants and default timer values for the WebCore hub.

/// Application-level ping frame (literal text, not JSON).
pub const WS_PING_FRAME: &str = "?";

/// Application-level pong frame (literal text, not JSON).
pub const WS_PONG_FRAME: &str = "!";

/// Largest request ID the wire format can carry without loss (2^53 - 1).
///
/// The platform decodes IDs as IEEE 754 doubles, so the counter wraps back
/// to 1 once this ceiling is reached.
pub const MAX_REQUEST_ID: u64 = (1 << 53) - 1;

/// Default reconnect delay schedule in milliseconds (saturating at the last entry).
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 5_000, 10_000, 30_000];

/// Default interval between outbound pings in milliseconds.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// Default hard liveness timeout in milliseconds: no pong within this window
/// force-closes the connection.
pub const DEFAULT_PONG_TIMEOUT_MS: u64 = 120_000;

/// Default idle window in milliseconds after which the hub closes voluntarily.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 300_000;

/// Default soft per-packet timeout in milliseconds before retransmission.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default timeout in milliseconds for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Internal timer resolution for the handler event loop in milliseconds.
pub const HANDLER_TICK_MS: u64 = 50;
