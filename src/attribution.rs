// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Short-lived memory of who issued the last "open" command.
//!
//! A command travels to the device and is echoed back on the command topic
//! right away, but the matching status change only arrives after the
//! actuator has moved. The tracker bridges that gap: the echo records the
//! origin, and the next "opened" status consumes it. Origins that are not
//! consumed within the window are forgotten, so a later manual opening is
//! not credited to a stale command.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Default attribution window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(40);

/// Single-slot store for the pending command origin of one device.
///
/// A new record overwrites the pending one and restarts the expiry timer.
/// Consuming returns the label at most once.
///
/// # Examples
///
/// ```
/// use gate_relay::attribution::AttributionTracker;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tracker = AttributionTracker::default();
/// tracker.record_command_origin("Ana via iPhone Web");
///
/// assert_eq!(tracker.consume_origin().as_deref(), Some("Ana via iPhone Web"));
/// assert_eq!(tracker.consume_origin(), None);
/// # }
/// ```
#[derive(Debug)]
pub struct AttributionTracker {
    window: Duration,
    slot: Arc<Mutex<Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<Pending>,
    /// Bumped on every record; a timer only clears its own generation.
    generation: u64,
}

#[derive(Debug)]
struct Pending {
    label: String,
    expires_at: Instant,
    timer: Option<AbortHandle>,
}

impl Pending {
    fn cancel(self) -> String {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        self.label
    }
}

impl AttributionTracker {
    /// Creates a tracker that forgets origins after `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Returns the attribution window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stores `label` as the pending origin and (re)schedules its expiry.
    ///
    /// Outside a tokio runtime no timer is spawned; the label still expires
    /// lazily when consumed.
    pub fn record_command_origin(&self, label: impl Into<String>) {
        let label = label.into();
        let mut slot = self.slot.lock();

        if let Some(previous) = slot.pending.take() {
            let previous = previous.cancel();
            tracing::debug!(previous = %previous, "Replacing pending attribution");
        }

        slot.generation += 1;
        let generation = slot.generation;

        let timer = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let slot = Arc::downgrade(&self.slot);
            let window = self.window;
            handle
                .spawn(async move {
                    tokio::time::sleep(window).await;
                    expire(&slot, generation);
                })
                .abort_handle()
        });

        tracing::debug!(
            origin = %label,
            window_secs = self.window.as_secs(),
            "Attribution recorded"
        );
        slot.pending = Some(Pending {
            label,
            expires_at: Instant::now() + self.window,
            timer,
        });
    }

    /// Takes the pending origin, cancelling its expiry.
    ///
    /// Returns `None` if nothing is pending or the origin already expired.
    pub fn consume_origin(&self) -> Option<String> {
        let pending = self.slot.lock().pending.take()?;
        let expired = pending.expires_at <= Instant::now();
        let label = pending.cancel();
        if expired {
            tracing::debug!(origin = %label, "Pending attribution already expired");
            return None;
        }
        Some(label)
    }

    /// Discards the pending origin without returning it.
    pub fn clear(&self) {
        if let Some(pending) = self.slot.lock().pending.take() {
            let label = pending.cancel();
            tracing::debug!(origin = %label, "Attribution cleared");
        }
    }

    /// Returns `true` while an origin is stored, expired or not.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}

impl Default for AttributionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl Drop for AttributionTracker {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Timer callback: clears the slot if it still holds `generation`.
fn expire(slot: &Weak<Mutex<Slot>>, generation: u64) {
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut slot = slot.lock();
    if slot.generation != generation {
        return;
    }
    if let Some(pending) = slot.pending.take() {
        tracing::debug!(origin = %pending.label, "Attribution expired");
    }
}
