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

//! Injected collaborators of the hub.
//!
//! The hub owns no URL discovery or credential storage of its own; both are
//! injected at construction. The URL is re-resolved on every connection
//! attempt so deployments with rotating gateways keep working across
//! reconnects.

use std::sync::RwLock;

use async_trait::async_trait;

/// Resolves the WebSocket endpoint URL for the next connection attempt.
#[async_trait]
pub trait WsUrlProvider: Send + Sync {
    /// Resolves the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution fails; the hub logs it and retries on
    /// the reconnect schedule.
    async fn websocket_url(&self) -> anyhow::Result<String>;
}

/// Supplies the authentication state of the embedding application.
pub trait WsAuthProvider: Send + Sync {
    /// Returns whether a user session exists.
    fn is_authenticated(&self) -> bool;

    /// Returns the API key for the current session, if any.
    fn api_key(&self) -> Option<String>;
}

/// A [`WsUrlProvider`] returning a fixed URL.
#[derive(Debug, Clone)]
pub struct StaticUrlProvider {
    url: String,
}

impl StaticUrlProvider {
    /// Creates a new [`StaticUrlProvider`].
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl WsUrlProvider for StaticUrlProvider {
    async fn websocket_url(&self) -> anyhow::Result<String> {
        Ok(self.url.clone())
    }
}

/// A [`WsAuthProvider`] backed by an in-memory key, settable at runtime.
#[derive(Debug, Default)]
pub struct StaticAuthProvider {
    key: RwLock<Option<String>>,
}

impl StaticAuthProvider {
    /// Creates a new [`StaticAuthProvider`] with an optional initial key.
    #[must_use]
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: RwLock::new(key),
        }
    }

    /// Sets or clears the API key (e.g. after login or logout).
    pub fn set_key(&self, key: Option<String>) {
        match self.key.write() {
            Ok(mut guard) => *guard = key,
            Err(poisoned) => *poisoned.into_inner() = key,
        }
    }
}

impl WsAuthProvider for StaticAuthProvider {
    fn is_authenticated(&self) -> bool {
        self.api_key().is_some()
    }

    fn api_key(&self) -> Option<String> {
        match self.key.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
