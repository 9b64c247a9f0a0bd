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

//! Enumerations for hub connection state and the wire protocol.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Lifecycle state of the hub connection.
///
/// Transitions follow `Disconnected -> Connecting -> Open -> OpenAndAuthenticated`,
/// and any state may fall back to `Disconnected`.
#[repr(u8)]
#[derive(
    Debug,
    Default,
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
pub enum ConnectionStatus {
    /// No socket; either initial state, after a failure, or after a voluntary close.
    #[default]
    Disconnected = 0,
    /// A connection attempt is in flight.
    Connecting = 1,
    /// Socket established; only packets not requiring auth may flow.
    Open = 2,
    /// Socket established and the session is authenticated.
    OpenAndAuthenticated = 3,
}

impl ConnectionStatus {
    /// Decodes a status from its `u8` representation (unknown values map to `Disconnected`).
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::OpenAndAuthenticated,
            _ => Self::Disconnected,
        }
    }

    /// Returns whether a socket is established.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open | Self::OpenAndAuthenticated)
    }
}

/// Purpose discriminator carried by every JSON frame.
///
/// `Request`, `Update`, `Create` and `Delete` are reserved request goals the
/// platform defines but the hub does not originate itself; they are treated
/// as data-plane traffic.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WsGoal {
    /// Session authentication.
    Auth,
    /// Subscription creation.
    Subscribe,
    /// Subscription teardown.
    Unsubscribe,
    /// Connection status query.
    Status,
    /// Data-plane request or server push.
    Data,
    /// Reserved request goal.
    Request,
    /// Reserved request goal.
    Update,
    /// Reserved request goal.
    Create,
    /// Reserved request goal.
    Delete,
}

impl WsGoal {
    /// Returns whether packets with this goal are control-plane.
    ///
    /// Control packets are bound to the session that produced them and are
    /// rejected on disconnect; data-plane packets survive for retransmission.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Auth | Self::Subscribe | Self::Unsubscribe | Self::Status
        )
    }
}

/// Lifecycle state of a subscription.
#[repr(u8)]
#[derive(
    Debug,
    Default,
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
pub enum SubscriptionStatus {
    /// Not registered with the server (initial state, or after a disconnect).
    #[default]
    Inactive = 0,
    /// Subscribe request sent, awaiting acknowledgment.
    Pending = 1,
    /// Acknowledged by the server and receiving pushes.
    Active = 2,
    /// Terminally cancelled; never re-subscribed.
    Cancelled = 3,
}

impl SubscriptionStatus {
    /// Decodes a status from its `u8` representation (unknown values map to `Inactive`).
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pending,
            2 => Self::Active,
            3 => Self::Cancelled,
            _ => Self::Inactive,
        }
    }
}

/// Mutation kind carried inside pushed data frames.
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
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DataOperation {
    /// Entity created.
    Create,
    /// Entity updated.
    Update,
    /// Entity deleted.
    Delete,
}
