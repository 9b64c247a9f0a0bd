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

//! Outbound packet queue for the multiplexed channel.
//!
//! Every outbound frame is tracked as a [`Packet`] until its correlated
//! response arrives. Packets whose auth gate is not yet satisfied wait in the
//! queue; unanswered packets have their sent mark cleared after a soft
//! timeout so the next delivery pass retransmits them. On disconnect,
//! control-goal packets are rejected while data-plane packets survive for
//! the next session.

use std::time::Instant;

use tokio::sync::oneshot;

use super::error::{WebCoreWsError, WebCoreWsResult};
use crate::common::{consts::MAX_REQUEST_ID, enums::WsGoal};

/// Channel resolving a request with its response frame.
pub type PacketResponder = oneshot::Sender<WebCoreWsResult<serde_json::Value>>;

/// An outbound frame awaiting delivery and response.
#[derive(Debug)]
pub struct Packet {
    /// Request ID carried in the frame.
    pub id: u64,
    /// Frame goal.
    pub goal: WsGoal,
    /// The complete wire frame (including `id` and `goal`).
    pub payload: serde_json::Value,
    /// Whether delivery requires an authenticated session.
    pub need_auth: bool,
    /// When the packet was last written to the socket (`None` = due for delivery).
    pub sent_at: Option<Instant>,
    /// When the packet was enqueued.
    pub created_at: Instant,
    /// Number of delivery attempts so far.
    pub attempts: u32,
    responder: Option<PacketResponder>,
}

impl Packet {
    /// Creates a new [`Packet`].
    #[must_use]
    pub fn new(
        id: u64,
        goal: WsGoal,
        payload: serde_json::Value,
        need_auth: bool,
        responder: Option<PacketResponder>,
    ) -> Self {
        Self {
            id,
            goal,
            payload,
            need_auth,
            sent_at: None,
            created_at: Instant::now(),
            attempts: 0,
            responder,
        }
    }

    /// Resolves the packet with a successful response.
    pub fn resolve(mut self, response: serde_json::Value) {
        if let Some(tx) = self.responder.take() {
            let _ = tx.send(Ok(response));
        }
    }

    /// Rejects the packet with an error.
    pub fn reject(mut self, error: WebCoreWsError) {
        if let Some(tx) = self.responder.take() {
            let _ = tx.send(Err(error));
        }
    }
}

/// Ordered queue of outbound packets with request ID allocation.
#[derive(Debug, Default)]
pub struct PacketQueue {
    packets: Vec<Packet>,
    next_id: u64,
}

impl PacketQueue {
    /// Creates a new empty [`PacketQueue`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            packets: Vec::new(),
            next_id: 1,
        }
    }

    /// Allocates the next request ID, wrapping past the wire format's
    /// safe-integer ceiling.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = if id >= MAX_REQUEST_ID { 1 } else { id + 1 };
        id
    }

    /// Enqueues a packet.
    pub fn push(&mut self, packet: Packet) {
        self.packets.push(packet);
    }

    /// Returns the number of queued packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Returns whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Removes and returns the packet matching both request ID and goal.
    pub fn complete(&mut self, id: u64, goal: WsGoal) -> Option<Packet> {
        let index = self
            .packets
            .iter()
            .position(|p| p.id == id && p.goal == goal)?;
        Some(self.packets.remove(index))
    }

    /// Clears the sent mark of packets unanswered for longer than `timeout`,
    /// making them due for retransmission. Returns the number of expirations.
    pub fn expire_stale(&mut self, timeout: std::time::Duration, now: Instant) -> usize {
        let mut expired = 0;
        for packet in &mut self.packets {
            if let Some(sent_at) = packet.sent_at {
                if now.duration_since(sent_at) >= timeout {
                    packet.sent_at = None;
                    expired += 1;
                }
            }
        }
        expired
    }

    /// Handles a disconnect: control-goal packets are removed and rejected
    /// with [`WebCoreWsError::ConnectionTerminated`]; surviving data-plane
    /// packets have their sent mark cleared. Returns the rejection count.
    pub fn reject_control(&mut self) -> usize {
        let mut rejected = 0;
        let mut index = 0;
        while index < self.packets.len() {
            if self.packets[index].goal.is_control() {
                let packet = self.packets.remove(index);
                packet.reject(WebCoreWsError::ConnectionTerminated);
                rejected += 1;
            } else {
                self.packets[index].sent_at = None;
                index += 1;
            }
        }
        rejected
    }

    /// Removes and rejects every queued packet with the given error.
    pub fn reject_all(&mut self, error: &WebCoreWsError) {
        for packet in self.packets.drain(..) {
            packet.reject(error.clone());
        }
    }

    /// Returns packets due for delivery given the current auth state.
    pub fn pending_mut(&mut self, authenticated: bool) -> impl Iterator<Item = &mut Packet> {
        self.packets
            .iter_mut()
            .filter(move |p| p.sent_at.is_none() && (authenticated || !p.need_auth))
    }
}
