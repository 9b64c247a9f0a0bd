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

//! Authentication tracking for the hub's auth gate.
//!
//! Multiple callers can await the outcome of the in-flight authentication;
//! the tracker resolves all of them when the auth response arrives.

use tokio::sync::oneshot;

use super::error::{WebCoreWsError, WebCoreWsResult};

/// Waiter channel resolved with the authentication outcome.
pub type AuthWaiter = oneshot::Sender<WebCoreWsResult<()>>;

/// Tracks callers awaiting the in-flight authentication outcome.
#[derive(Debug, Default)]
pub struct AuthTracker {
    waiters: Vec<AuthWaiter>,
}

impl AuthTracker {
    /// Creates a new empty [`AuthTracker`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter and returns its receiver.
    pub fn begin(&mut self) -> oneshot::Receiver<WebCoreWsResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    /// Registers an externally created waiter.
    pub fn register(&mut self, waiter: AuthWaiter) {
        self.waiters.push(waiter);
    }

    /// Resolves all waiters with success.
    pub fn succeed(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Resolves all waiters with an authentication failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.waiters.is_empty() {
            return;
        }
        let message = message.into();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(WebCoreWsError::Authentication(message.clone())));
        }
    }

    /// Returns whether any caller is awaiting an outcome.
    #[must_use]
    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }
}
