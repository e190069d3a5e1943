// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan-out of device state to live subscribers.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{StateUpdate, SubscriberId};

/// Default number of updates buffered per subscriber.
const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Holds the live subscriber set and the last-known state of every device.
///
/// Membership changes and broadcasts are serialized by a single lock, so a
/// subscriber receives the snapshot as of its join followed by every update
/// broadcast afterwards, with nothing lost or duplicated in between.
///
/// Each subscriber has a bounded buffer. A subscriber whose buffer is full
/// or whose receiving side is gone is dropped from the set on the next
/// broadcast; delivery to the others continues.
///
/// `Broadcaster` is cheaply cloneable and all clones share the same state.
///
/// # Examples
///
/// ```
/// use gate_relay::broadcast::{Broadcaster, StateUpdate};
///
/// let broadcaster = Broadcaster::new(["gate"]);
/// broadcaster.broadcast(StateUpdate::new("gate", "ESTADO_REAL_FECHADO"));
///
/// // A late subscriber still learns the current state
/// let mut subscription = broadcaster.subscribe();
/// assert_eq!(
///     subscription.try_recv(),
///     Some(StateUpdate::new("gate", "ESTADO_REAL_FECHADO"))
/// );
/// ```
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    /// Current state per device, in registration order.
    snapshot: Vec<StateUpdate>,
    members: HashMap<SubscriberId, mpsc::Sender<StateUpdate>>,
    next_id: u64,
    buffer: usize,
}

impl Broadcaster {
    /// Creates a broadcaster with every device in the awaiting-report state.
    #[must_use]
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_buffer(devices, DEFAULT_SUBSCRIBER_BUFFER)
    }

    /// Creates a broadcaster with the given per-subscriber buffer size.
    #[must_use]
    pub fn with_buffer<I, S>(devices: I, buffer: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let snapshot = devices
            .into_iter()
            .map(|device| StateUpdate::new(device, crate::types::AWAITING_REPORT))
            .collect();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                snapshot,
                members: HashMap::new(),
                next_id: 1,
                buffer: buffer.max(1),
            })),
        }
    }

    /// Joins the subscriber set.
    ///
    /// The returned subscription already holds the current state of every
    /// device before any later broadcast.
    #[must_use]
    pub fn subscribe(&self) -> LiveSubscription {
        let mut inner = self.inner.lock();

        let id = SubscriberId::new(inner.next_id);
        inner.next_id += 1;

        let (tx, rx) = mpsc::channel(inner.buffer + inner.snapshot.len());
        for update in &inner.snapshot {
            // Capacity covers the whole snapshot
            let _ = tx.try_send(update.clone());
        }
        inner.members.insert(id, tx);

        tracing::debug!(
            subscriber = %id,
            subscribers = inner.members.len(),
            "Live subscriber joined"
        );

        LiveSubscription {
            id,
            receiver: rx,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Leaves the subscriber set. Returns `true` if `id` was a member.
    ///
    /// Safe to call repeatedly or after the subscriber already went away.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        remove_member(&self.inner, id)
    }

    /// Records `update` as the device's current state and delivers it to
    /// every subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn broadcast(&self, update: StateUpdate) -> usize {
        let mut inner = self.inner.lock();

        match inner
            .snapshot
            .iter()
            .position(|entry| entry.device == update.device)
        {
            Some(index) => inner.snapshot[index].state.clone_from(&update.state),
            None => inner.snapshot.push(update.clone()),
        }

        inner.members.retain(|id, tx| match tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = %id, "Live subscriber lagging, dropping it");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = %id, "Live subscriber gone");
                false
            }
        });

        tracing::debug!(
            device = %update.device,
            state = %update.state,
            subscribers = inner.members.len(),
            "Broadcast state update"
        );

        inner.members.len()
    }

    /// Returns the current state of every device.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StateUpdate> {
        self.inner.lock().snapshot.clone()
    }

    /// Returns the current state of one device.
    #[must_use]
    pub fn current_state(&self, device: &str) -> Option<String> {
        self.inner
            .lock()
            .snapshot
            .iter()
            .find(|entry| entry.device == device)
            .map(|entry| entry.state.clone())
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().members.len()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Broadcaster")
            .field("devices", &inner.snapshot.len())
            .field("subscribers", &inner.members.len())
            .finish()
    }
}

fn remove_member(inner: &Mutex<Inner>, id: SubscriberId) -> bool {
    let mut inner = inner.lock();
    let removed = inner.members.remove(&id).is_some();
    if removed {
        tracing::debug!(
            subscriber = %id,
            subscribers = inner.members.len(),
            "Live subscriber left"
        );
    }
    removed
}

/// A live subscriber's end of the broadcast.
///
/// Yields the join-time snapshot first, then every later update. Dropping
/// the subscription removes it from the broadcaster.
pub struct LiveSubscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<StateUpdate>,
    broadcaster: Weak<Mutex<Inner>>,
}

impl LiveSubscription {
    /// Returns this subscriber's ID.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next update.
    ///
    /// Returns `None` once the subscriber has been dropped from the set and
    /// its buffer is drained.
    pub async fn recv(&mut self) -> Option<StateUpdate> {
        self.receiver.recv().await
    }

    /// Returns the next buffered update without waiting.
    pub fn try_recv(&mut self) -> Option<StateUpdate> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for LiveSubscription {
    type Item = StateUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            remove_member(&inner, self.id);
        }
    }
}

impl std::fmt::Debug for LiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
