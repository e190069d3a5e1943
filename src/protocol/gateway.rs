// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic routing between the backbone and the relay.
//!
//! ```text
//! Inbound: projeto_LG/casa/portao → ABRIR_PORTAO_AGORA|Ana|iPhone Web
//!                     ↓
//!             MessagingGateway.route()
//!                     ↓
//!     Lookup topic → ("gate", Command)
//!                     ↓
//!     on_inbound_command() → attribution.record_command_origin()
//!
//! Inbound: projeto_LG/casa/portao/status → ESTADO_REAL_ABERTO
//!                     ↓
//!     Lookup topic → ("gate", Status)
//!                     ↓
//!     on_inbound_status() → engine.on_status_observed()
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DeviceProfile;
use crate::error::Error;
use crate::notify::{Decision, NotificationEngine};
use crate::types::{CommandAction, CommandEncoding, CommandEnvelope};

use super::{Backbone, InboundMessage};

/// The role a topic plays for its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRole {
    /// Commands published to the device, echoed back by the broker.
    Command,
    /// Status reports from the device.
    Status,
}

/// Sole ingress and egress point between the relay and the backbone.
pub struct MessagingGateway {
    /// Topic to (device, role).
    routes: HashMap<String, (String, TopicRole)>,
    profiles: HashMap<String, DeviceProfile>,
    engine: Arc<NotificationEngine>,
    backbone: Arc<dyn Backbone>,
}

impl MessagingGateway {
    /// Creates a gateway for the given devices.
    #[must_use]
    pub fn new(
        profiles: &[DeviceProfile],
        engine: Arc<NotificationEngine>,
        backbone: Arc<dyn Backbone>,
    ) -> Self {
        let mut routes = HashMap::new();
        for profile in profiles {
            routes.insert(
                profile.command_topic.clone(),
                (profile.name.clone(), TopicRole::Command),
            );
            routes.insert(
                profile.status_topic.clone(),
                (profile.name.clone(), TopicRole::Status),
            );
        }

        let profiles = profiles
            .iter()
            .map(|profile| (profile.name.clone(), profile.clone()))
            .collect();

        Self {
            routes,
            profiles,
            engine,
            backbone,
        }
    }

    /// Returns the topics the backbone must subscribe to.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Looks up the device and role of `topic`.
    #[must_use]
    pub fn resolve(&self, topic: &str) -> Option<(&str, TopicRole)> {
        self.routes
            .get(topic)
            .map(|(device, role)| (device.as_str(), *role))
    }

    /// Dispatches an inbound message to the command or status handler.
    ///
    /// Returns `true` if the topic belongs to a configured device.
    pub fn route(&self, message: &InboundMessage) -> bool {
        let Some((device, role)) = self.resolve(&message.topic) else {
            tracing::trace!(topic = %message.topic, "Ignoring message on unrouted topic");
            return false;
        };

        match role {
            TopicRole::Command => {
                self.on_inbound_command(device, &message.payload);
            }
            TopicRole::Status => {
                self.on_inbound_status(device, &message.payload);
            }
        }
        true
    }

    /// Handles a command seen on a device's command topic.
    ///
    /// Open commands from attributed devices record their origin. Returns
    /// the recorded label, if any.
    pub fn on_inbound_command(&self, device: &str, payload: &str) -> Option<String> {
        let profile = self.profiles.get(device)?;

        if profile.encoding == CommandEncoding::Plain {
            tracing::debug!(
                device = %device,
                payload = %payload,
                "Plain command carries no origin"
            );
            return None;
        }

        let envelope = match CommandEnvelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(device = %device, error = %e, "Dropping malformed command");
                return None;
            }
        };

        if CommandAction::classify(&envelope.action, profile) != CommandAction::Open {
            tracing::debug!(
                device = %device,
                action = %envelope.action,
                "Command is not an opening"
            );
            return None;
        }

        let label = envelope.origin_label();
        self.engine
            .attribution(device)?
            .record_command_origin(label.clone());
        Some(label)
    }

    /// Handles a status report on a device's status topic.
    pub fn on_inbound_status(&self, device: &str, payload: &str) -> Decision {
        self.engine.on_status_observed(device, payload)
    }

    /// Encodes and publishes a command for `device`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDevice`] if the device is not configured, or a
    /// protocol error if the backbone rejects the message.
    pub fn publish_command(
        &self,
        device: &str,
        action: &str,
        actor_name: &str,
        actor_device_class: &str,
    ) -> Result<(), Error> {
        let profile = self
            .profiles
            .get(device)
            .ok_or_else(|| Error::UnknownDevice(device.to_string()))?;

        let payload = CommandEnvelope::new(action, actor_name, actor_device_class)
            .encode(profile.encoding);

        tracing::info!(
            device = %device,
            topic = %profile.command_topic,
            payload = %payload,
            "Publishing command"
        );

        self.backbone
            .publish(&profile.command_topic, &payload)
            .map_err(Error::from)
    }
}

impl std::fmt::Debug for MessagingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingGateway")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::error::ProtocolError;

    #[derive(Default)]
    struct RecordingBackbone {
        published: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Backbone for RecordingBackbone {
        fn publish(&self, topic: &str, payload: &str) -> Result<(), ProtocolError> {
            if self.fail {
                return Err(ProtocolError::ConnectionFailed("offline".to_string()));
            }
            self.published
                .lock()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    fn gateway_with(backbone: Arc<RecordingBackbone>) -> MessagingGateway {
        let profiles = [DeviceProfile::gate(), DeviceProfile::pump()];
        let engine = NotificationEngine::builder(Broadcaster::new(["gate", "pump"]))
            .devices(profiles.clone())
            .build();
        MessagingGateway::new(&profiles, Arc::new(engine), backbone)
    }

    fn gateway() -> (MessagingGateway, Arc<RecordingBackbone>) {
        let backbone = Arc::new(RecordingBackbone::default());
        (gateway_with(backbone.clone()), backbone)
    }

    #[test]
    fn subscriptions_cover_every_topic() {
        let (gateway, _) = gateway();
        assert_eq!(
            gateway.subscriptions(),
            vec![
                "projeto_LG/casa/bomba",
                "projeto_LG/casa/bomba/status",
                "projeto_LG/casa/portao",
                "projeto_LG/casa/portao/status",
            ]
        );
    }

    #[test]
    fn resolve_topics() {
        let (gateway, _) = gateway();
        assert_eq!(
            gateway.resolve("projeto_LG/casa/portao"),
            Some(("gate", TopicRole::Command))
        );
        assert_eq!(
            gateway.resolve("projeto_LG/casa/bomba/status"),
            Some(("pump", TopicRole::Status))
        );
        assert_eq!(gateway.resolve("projeto_LG/casa/luz"), None);
    }

    #[test]
    fn publish_attributed_command() {
        let (gateway, backbone) = gateway();
        gateway
            .publish_command("gate", "ABRIR_PORTAO_AGORA", "Ana", "iPhone Web")
            .unwrap();

        assert_eq!(
            backbone.published.lock().as_slice(),
            &[(
                "projeto_LG/casa/portao".to_string(),
                "ABRIR_PORTAO_AGORA|Ana|iPhone Web".to_string()
            )]
        );
    }

    #[test]
    fn publish_plain_command() {
        let (gateway, backbone) = gateway();
        gateway
            .publish_command("pump", "LIGAR_BOMBA", "Ana", "iPhone Web")
            .unwrap();

        assert_eq!(
            backbone.published.lock()[0],
            ("projeto_LG/casa/bomba".to_string(), "LIGAR_BOMBA".to_string())
        );
    }

    #[test]
    fn publish_to_unknown_device_fails() {
        let (gateway, backbone) = gateway();
        let err = gateway
            .publish_command("garage", "ABRIR", "Ana", "PC Windows")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(name) if name == "garage"));
        assert!(backbone.published.lock().is_empty());
    }

    #[test]
    fn publish_failure_is_reported() {
        let backbone = Arc::new(RecordingBackbone {
            fail: true,
            ..Default::default()
        });
        let gateway = gateway_with(backbone);
        let err = gateway
            .publish_command("gate", "ABRIR_PORTAO_AGORA", "Ana", "PC Windows")
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn open_echo_records_origin() {
        let (gateway, _) = gateway();
        let routed = gateway.route(&InboundMessage::new(
            "projeto_LG/casa/portao",
            "ABRIR_PORTAO_AGORA|Ana|iPhone Web",
        ));

        assert!(routed);
        assert!(gateway.engine.attribution("gate").unwrap().is_pending());
        assert_eq!(
            gateway
                .engine
                .attribution("gate")
                .unwrap()
                .consume_origin()
                .as_deref(),
            Some("Ana via iPhone Web")
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let (gateway, _) = gateway();
        let label = gateway.on_inbound_command("gate", "ABRIR_PORTAO_AGORA|Ana|PC Windows|extra");
        assert_eq!(label.as_deref(), Some("Ana via PC Windows"));
    }

    #[test]
    fn malformed_command_is_dropped() {
        let (gateway, _) = gateway();
        assert_eq!(gateway.on_inbound_command("gate", "ABRIR_PORTAO_AGORA|Ana"), None);
        assert!(!gateway.engine.attribution("gate").unwrap().is_pending());
    }

    #[test]
    fn non_open_command_records_nothing() {
        let (gateway, _) = gateway();
        assert_eq!(
            gateway.on_inbound_command("gate", "ATUALIZAR_FIRMWARE|Ana|PC Windows"),
            None
        );
        assert!(!gateway.engine.attribution("gate").unwrap().is_pending());
    }

    #[test]
    fn plain_device_carries_no_origin() {
        let (gateway, _) = gateway();
        assert_eq!(gateway.on_inbound_command("pump", "LIGAR_BOMBA|Ana|PC Windows"), None);
        assert!(!gateway.engine.attribution("pump").unwrap().is_pending());
    }

    #[test]
    fn status_reaches_engine() {
        let (gateway, _) = gateway();
        let decision = gateway.on_inbound_status("gate", "ESTADO_REAL_FECHADO");
        assert!(matches!(decision, Decision::Notified(_)));
    }

    #[test]
    fn unrouted_topic_is_ignored() {
        let (gateway, _) = gateway();
        assert!(!gateway.route(&InboundMessage::new("other/topic", "x")));
    }
}
