// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live state fan-out.
//!
//! The [`Broadcaster`] owns the last-known state of every device and the set
//! of connected live subscribers (browsers on the `/events` stream). A new
//! subscriber receives the current snapshot immediately and then every
//! update in broadcast order.

mod broadcaster;
mod update;

pub use broadcaster::{Broadcaster, LiveSubscription};
pub use update::{StateUpdate, SubscriberId};
