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

//! WebCore WebSocket hub error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Error types for the WebCore WebSocket hub.
#[derive(Debug, Clone, Error)]
pub enum WebCoreWsError {
    /// Hub is not connected.
    #[error("Not connected")]
    NotConnected,
    /// Transport-level error during WebSocket communication.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Failed to send a frame over the WebSocket.
    #[error("Send error: {0}")]
    Send(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// Authentication failed or no credentials available.
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// Generic client error.
    #[error("Client error: {0}")]
    ClientError(String),
    /// Malformed frame received from the server.
    #[error("Parsing error: {0}")]
    ParsingError(String),
    /// Application-level error returned by the platform (`resultCode != 0`).
    #[error("Server error {code}: {message}")]
    ServerError {
        /// The result code from the platform.
        code: i64,
        /// The result code message from the platform.
        message: String,
    },
    /// Request or operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// The connection was terminated while a control packet was in flight.
    #[error("Connection terminated")]
    ConnectionTerminated,
}

impl From<tungstenite::Error> for WebCoreWsError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for WebCoreWsError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<String> for WebCoreWsError {
    fn from(msg: String) -> Self {
        Self::ClientError(msg)
    }
}

/// Result type alias for WebCore WebSocket hub operations.
pub type WebCoreWsResult<T> = Result<T, WebCoreWsError>;

/// Determines if an error should trigger a retry.
///
/// Transport-class failures are retried by the hub's reconnect machinery;
/// application and protocol failures are surfaced to the caller.
#[must_use]
pub fn should_retry_webcore_ws_error(error: &WebCoreWsError) -> bool {
    matches!(
        error,
        WebCoreWsError::Transport(_)
            | WebCoreWsError::Send(_)
            | WebCoreWsError::NotConnected
            | WebCoreWsError::Timeout(_)
            | WebCoreWsError::ConnectionTerminated
    )
}
