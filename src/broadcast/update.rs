// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live update payloads and subscriber identifiers.

use std::fmt;

/// A device state change as seen by live subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    /// Name of the device that reported the state.
    pub device: String,
    /// The raw status token, forwarded verbatim.
    pub state: String,
}

impl StateUpdate {
    /// Creates a new update.
    #[must_use]
    pub fn new(device: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            state: state.into(),
        }
    }
}

/// Identifier of a live subscriber.
///
/// IDs increase monotonically for the lifetime of a broadcaster, so a later
/// connection always has a larger ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}
