// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messaging backbone plumbing.
//!
//! The [`MessagingGateway`] is the only component that talks to the
//! backbone: it routes inbound messages by topic and publishes outbound
//! commands through a [`Backbone`] implementation.
//!
//! # Backbones
//!
//! - [`MqttBackbone`]: rumqttc connection with automatic reconnection
//!   (feature `mqtt`)

mod gateway;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use gateway::{MessagingGateway, TopicRole};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBackbone, MqttBackboneBuilder};

use crate::error::ProtocolError;

/// A message received from the backbone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// UTF-8 payload.
    pub payload: String,
}

impl InboundMessage {
    /// Creates a new inbound message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound side of a publish/subscribe backbone.
///
/// Publishing must not block: implementations enqueue the message and
/// return. Delivery is at-least-once at best; messages may be lost while
/// disconnected.
pub trait Backbone: Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the message could not be enqueued.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), ProtocolError>;
}
