// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application state shared by the HTTP surface and the inbound pump.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::config::{DeviceProfile, RelayConfig};
use crate::error::ConfigError;
use crate::notify::{NotificationEngine, PushSink};
use crate::protocol::{Backbone, InboundMessage, MessagingGateway};
use crate::session::SessionStore;

/// Owns every stateful component of the relay.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use gate_relay::config::RelayConfig;
/// use gate_relay::error::ProtocolError;
/// use gate_relay::protocol::Backbone;
/// use gate_relay::relay::Relay;
///
/// struct Offline;
///
/// impl Backbone for Offline {
///     fn publish(&self, _topic: &str, _payload: &str) -> Result<(), ProtocolError> {
///         Err(ProtocolError::ConnectionFailed("offline".to_string()))
///     }
/// }
///
/// let config = RelayConfig {
///     app_password: "secret".to_string(),
///     ..RelayConfig::default()
/// };
/// let relay = Relay::new(&config, Arc::new(Offline), None).unwrap();
/// assert_eq!(relay.primary_device(), "gate");
/// ```
pub struct Relay {
    primary: String,
    profiles: Vec<DeviceProfile>,
    sessions: SessionStore,
    broadcaster: Broadcaster,
    engine: Arc<NotificationEngine>,
    gateway: MessagingGateway,
    static_dir: Option<PathBuf>,
}

impl Relay {
    /// Wires the relay components together.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(
        config: &RelayConfig,
        backbone: Arc<dyn Backbone>,
        sink: Option<Arc<dyn PushSink>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let profiles = config.device_profiles();
        let primary = profiles
            .first()
            .map(|profile| profile.name.clone())
            .ok_or(ConfigError::NoDevices)?;

        let broadcaster = Broadcaster::with_buffer(
            profiles.iter().map(|profile| profile.name.clone()),
            config.subscriber_buffer,
        );

        let mut engine = NotificationEngine::builder(broadcaster.clone())
            .devices(profiles.iter().cloned())
            .min_interval(config.notification_interval())
            .attribution_window(config.attribution_window());
        if let Some(sink) = sink {
            engine = engine.sink(sink);
        }
        let engine = Arc::new(engine.build());

        let gateway = MessagingGateway::new(&profiles, Arc::clone(&engine), backbone);

        tracing::info!(
            devices = ?profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            primary = %primary,
            "Relay initialized"
        );

        Ok(Self {
            primary,
            profiles,
            sessions: SessionStore::new(config.app_password.clone()),
            broadcaster,
            engine,
            gateway,
            static_dir: config.static_dir.clone(),
        })
    }

    /// Returns the device commands default to.
    #[must_use]
    pub fn primary_device(&self) -> &str {
        &self.primary
    }

    /// Returns the configured devices, primary first.
    #[must_use]
    pub fn profiles(&self) -> &[DeviceProfile] {
        &self.profiles
    }

    /// Returns the profile of `device`.
    #[must_use]
    pub fn profile(&self, device: &str) -> Option<&DeviceProfile> {
        self.profiles.iter().find(|profile| profile.name == device)
    }

    /// Returns the session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Returns the live-update broadcaster.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Returns the notification engine.
    #[must_use]
    pub fn engine(&self) -> &NotificationEngine {
        &self.engine
    }

    /// Returns the messaging gateway.
    #[must_use]
    pub fn gateway(&self) -> &MessagingGateway {
        &self.gateway
    }

    /// Returns the static asset directory, if any.
    #[must_use]
    pub fn static_dir(&self) -> Option<&Path> {
        self.static_dir.as_deref()
    }

    /// Spawns the task that feeds inbound backbone messages to the gateway.
    ///
    /// Messages are processed one at a time in delivery order. The task ends
    /// when the sending side is dropped.
    pub fn spawn_inbound(
        self: &Arc<Self>,
        mut inbound: mpsc::Receiver<InboundMessage>,
    ) -> JoinHandle<()> {
        let relay = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                relay.gateway.route(&message);
            }
            tracing::info!("Inbound message stream closed");
        })
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("primary", &self.primary)
            .field("sessions", &self.sessions)
            .field("broadcaster", &self.broadcaster)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
