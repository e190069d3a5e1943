// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gate Relay - a home-automation relay between a web client and MQTT devices.
//!
//! The relay sits between a password-protected web page and one or more
//! devices (a gate, optionally a water pump) that speak a small text
//! protocol over MQTT. It:
//!
//! - publishes commands issued through the HTTP API, tagged with who sent them
//! - fans every status report out to connected browsers over Server-Sent Events
//! - sends a push notification (ntfy) when a device settles open or closed,
//!   crediting the person whose command caused the opening
//!
//! # Architecture
//!
//! ```text
//! HTTP API ──► SessionStore (auth) ──► MessagingGateway ──► Backbone (MQTT)
//!
//! Backbone ──► MessagingGateway ─┬─► AttributionTracker (command echo)
//!                                └─► NotificationEngine (status)
//!                                         ├─► Broadcaster ──► /events
//!                                         └─► PushSink (ntfy)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gate_relay::config::RelayConfig;
//! use gate_relay::notify::{NtfyConfig, PushSink};
//! use gate_relay::protocol::MqttBackbone;
//! use gate_relay::relay::Relay;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::load("gate-relay.toml".as_ref())?;
//!     let topics: Vec<String> = config
//!         .device_profiles()
//!         .iter()
//!         .flat_map(|p| [p.command_topic.clone(), p.status_topic.clone()])
//!         .collect();
//!
//!     let (backbone, inbound) = MqttBackbone::builder()
//!         .url(&config.mqtt_url)
//!         .subscribe(topics)
//!         .build()
//!         .await?;
//!
//!     let sink: Arc<dyn PushSink> = Arc::new(NtfyConfig::new("casa-portao").into_sink()?);
//!     let relay = Arc::new(Relay::new(&config, Arc::new(backbone), Some(sink))?);
//!     relay.spawn_inbound(inbound);
//!
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
//!     axum::serve(listener, gate_relay::api::router(relay)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `mqtt` (default): [`protocol::MqttBackbone`] over rumqttc
//! - `ntfy` (default): [`notify::NtfySink`] over reqwest

pub mod api;
pub mod attribution;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod types;

pub use attribution::AttributionTracker;
pub use broadcast::{Broadcaster, LiveSubscription, StateUpdate, SubscriberId};
pub use config::{DeviceProfile, ReconnectionPolicy, RelayConfig};
pub use error::{AuthError, ConfigError, Error, ParseError, ProtocolError, Result};
pub use notify::{Decision, Notification, NotificationEngine, PushSink};
pub use protocol::{Backbone, InboundMessage, MessagingGateway};
pub use relay::Relay;
pub use session::{SessionStore, SessionToken};
pub use types::{CommandAction, CommandEncoding, CommandEnvelope, DeviceStatus};
