// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push notifications for device state transitions.
//!
//! The [`NotificationEngine`] decides *whether* a status report deserves a
//! push notification; a [`PushSink`] delivers it. Sinks are fire-and-forget:
//! a failed delivery is logged by the sink and never reaches the engine.

mod engine;
#[cfg(feature = "ntfy")]
mod ntfy;

pub use engine::{Decision, NotificationEngine, NotificationEngineBuilder, REMOTE_CONTROL_ORIGIN};
#[cfg(feature = "ntfy")]
pub use ntfy::{NtfyConfig, NtfySink};

/// A push notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Device the notification is about.
    pub device: String,
    /// Short title.
    pub title: String,
    /// Body text, including the attribution line for openings.
    pub message: String,
    /// Provider-specific tags (ntfy emoji shortcodes).
    pub tags: Vec<String>,
}

/// Destination for push notifications.
///
/// `dispatch` must return immediately; any I/O happens in the background and
/// its failures are logged, never returned.
pub trait PushSink: Send + Sync {
    /// Hands a notification over for delivery.
    fn dispatch(&self, notification: Notification);
}
