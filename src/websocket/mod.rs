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

//! WebSocket hub implementation.
//!
//! The public surface is [`client::WebCoreWsHub`]; all socket I/O and the
//! connection state machine run inside the feed handler on a dedicated Tokio
//! task, commanded over an unbounded channel.

pub mod auth;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub(crate) mod handler;
pub mod messages;
pub mod packet;
pub mod providers;
pub mod subscription;
