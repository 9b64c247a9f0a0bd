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

//! Table-based reconnect delay schedule.
//!
//! The platform specifies a fixed schedule rather than an exponential policy:
//! attempt N waits for entry N of the table, saturating at the last entry.
//! The schedule resets after every successful open.

use std::time::Duration;

/// Reconnect delay schedule.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    delays: Vec<Duration>,
    attempt: usize,
}

impl ReconnectSchedule {
    /// Creates a new [`ReconnectSchedule`] from a table of delays in
    /// milliseconds (an empty table behaves as a single zero delay).
    #[must_use]
    pub fn new(delays_ms: &[u64]) -> Self {
        let delays = if delays_ms.is_empty() {
            vec![Duration::ZERO]
        } else {
            delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
        };
        Self { delays, attempt: 0 }
    }

    /// Returns the delay for the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let index = self.attempt.min(self.delays.len() - 1);
        self.attempt = self.attempt.saturating_add(1);
        self.delays[index]
    }

    /// Returns the number of attempts made since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.attempt
    }

    /// Resets the schedule after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
