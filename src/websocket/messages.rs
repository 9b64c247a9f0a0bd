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

//! Data structures for WebCore WebSocket frames.
//!
//! All frames except the literal `"?"`/`"!"` ping-pong pair are JSON objects
//! carrying `id` and `goal`. Responses additionally carry `resultCode`
//! (0 = success) and optionally `resultCodeMessage`; subscribe responses add
//! `subscriptionId`; server pushes add a `data` envelope.

use serde::{Deserialize, Serialize};

use super::{
    error::{WebCoreWsError, WebCoreWsResult},
    subscription::{OperationMask, SubscriptionKind},
};
use crate::common::{
    consts::{WS_PING_FRAME, WS_PONG_FRAME},
    enums::{DataOperation, WsGoal},
};

/// Authentication request frame.
#[derive(Debug, Clone, Serialize)]
pub struct WsAuthRequest {
    /// Request ID.
    pub id: u64,
    /// Always `auth`.
    pub goal: WsGoal,
    /// API key of the authenticated user.
    pub key: String,
}

impl WsAuthRequest {
    /// Creates a new [`WsAuthRequest`].
    #[must_use]
    pub fn new(id: u64, key: String) -> Self {
        Self {
            id,
            goal: WsGoal::Auth,
            key,
        }
    }
}

/// Subscription description embedded in a subscribe request.
#[derive(Debug, Clone, Serialize)]
pub struct WsSubscriptionPayload {
    /// Domain discriminator (e.g. `LOCATION_STATES`).
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    /// Mask of mutation kinds the client wants pushed.
    pub operation: OperationMask,
    /// Scoping parameters, flattened into the subscription object.
    ///
    /// Must be a JSON object (e.g. `{"locationId": 5, "name": "x"}`).
    #[serde(flatten)]
    pub params: serde_json::Value,
}

/// Subscribe request frame.
#[derive(Debug, Clone, Serialize)]
pub struct WsSubscribeRequest {
    /// Request ID.
    pub id: u64,
    /// Always `subscribe`.
    pub goal: WsGoal,
    /// The subscription description.
    pub subscription: WsSubscriptionPayload,
}

impl WsSubscribeRequest {
    /// Creates a new [`WsSubscribeRequest`].
    #[must_use]
    pub fn new(id: u64, subscription: WsSubscriptionPayload) -> Self {
        Self {
            id,
            goal: WsGoal::Subscribe,
            subscription,
        }
    }
}

/// Unsubscribe request frame.
#[derive(Debug, Clone, Serialize)]
pub struct WsUnsubscribeRequest {
    /// Request ID.
    pub id: u64,
    /// Always `unsubscribe`.
    pub goal: WsGoal,
    /// Server-assigned subscription ID to tear down.
    #[serde(rename = "subscriptionId")]
    pub subscription_id: u64,
}

impl WsUnsubscribeRequest {
    /// Creates a new [`WsUnsubscribeRequest`].
    #[must_use]
    pub fn new(id: u64, subscription_id: u64) -> Self {
        Self {
            id,
            goal: WsGoal::Unsubscribe,
            subscription_id,
        }
    }
}

/// Data envelope carried by pushed frames.
#[derive(Debug, Clone, Deserialize)]
pub struct WsDataEnvelope {
    /// Which mutation produced this push.
    pub operation: DataOperation,
    /// Entity payload, flattened alongside `operation` on the wire.
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// Inbound JSON frame from the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct WsInboundFrame {
    /// Request ID this frame correlates to.
    pub id: u64,
    /// Frame goal.
    pub goal: WsGoal,
    /// Result code on responses (0 = success).
    #[serde(rename = "resultCode")]
    pub result_code: Option<i64>,
    /// Human-readable result message on failures.
    #[serde(rename = "resultCodeMessage")]
    pub result_code_message: Option<String>,
    /// Server-assigned subscription ID (subscribe responses and pushes).
    #[serde(rename = "subscriptionId")]
    pub subscription_id: Option<u64>,
    /// Data envelope on pushed frames.
    pub data: Option<WsDataEnvelope>,
}

impl WsInboundFrame {
    /// Returns whether this frame reports success (a missing `resultCode` on
    /// a push frame also counts as success).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code.unwrap_or(0) == 0
    }

    /// Returns the failure message, falling back to the result code.
    #[must_use]
    pub fn error_message(&self) -> String {
        match &self.result_code_message {
            Some(msg) if !msg.is_empty() => msg.clone(),
            _ => format!("resultCode {}", self.result_code.unwrap_or(-1)),
        }
    }
}

/// A decoded inbound text frame.
#[derive(Debug, Clone)]
pub enum WsInbound {
    /// Literal `"?"` liveness probe from the peer.
    Ping,
    /// Literal `"!"` liveness reply from the peer.
    Pong,
    /// A JSON frame, with the raw value preserved for response resolution.
    Frame {
        /// The decoded frame.
        frame: Box<WsInboundFrame>,
        /// The raw JSON value as received.
        raw: serde_json::Value,
    },
}

/// Parses a raw inbound text frame.
///
/// # Errors
///
/// Returns an error if the frame is neither a ping/pong literal nor a JSON
/// object carrying `id` and `goal`.
pub fn parse_raw_frame(text: &str) -> WebCoreWsResult<WsInbound> {
    if text == WS_PING_FRAME {
        return Ok(WsInbound::Ping);
    }
    if text == WS_PONG_FRAME {
        return Ok(WsInbound::Pong);
    }

    let raw: serde_json::Value = serde_json::from_str(text)?;

    if raw.get("id").and_then(serde_json::Value::as_u64).is_none() {
        return Err(WebCoreWsError::ParsingError(format!(
            "frame missing numeric 'id': {text}"
        )));
    }
    if raw.get("goal").and_then(serde_json::Value::as_str).is_none() {
        return Err(WebCoreWsError::ParsingError(format!(
            "frame missing 'goal': {text}"
        )));
    }

    let frame: WsInboundFrame = serde_json::from_value(raw.clone())
        .map_err(|e| WebCoreWsError::ParsingError(format!("{e}: {text}")))?;

    Ok(WsInbound::Frame {
        frame: Box::new(frame),
        raw,
    })
}
