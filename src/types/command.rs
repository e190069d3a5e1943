// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command payloads exchanged on a device's command topic.
//!
//! The wire format is fixed by each device's firmware. The gate expects an
//! attributed payload `ACTION|ActorName|ActorDeviceClass`; simpler devices
//! such as the pump take a bare action string.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DeviceProfile;
use crate::error::ParseError;

/// Field separator of attributed payloads.
const SEPARATOR: char = '|';

/// How commands are encoded for a particular device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandEncoding {
    /// `ACTION|ActorName|ActorDeviceClass`.
    #[default]
    Attributed,
    /// Bare `ACTION`.
    Plain,
}

/// The meaning of an action token for a particular device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Actuate the device (open the gate, start the pump).
    Open,
    /// Ask the device to fetch and flash new firmware.
    FirmwareUpdate,
    /// Any other action, passed through untouched.
    Custom(String),
}

impl CommandAction {
    /// Classifies an action token for the given device.
    #[must_use]
    pub fn classify(action: &str, profile: &DeviceProfile) -> Self {
        if action == profile.open_action {
            Self::Open
        } else if action == profile.update_action {
            Self::FirmwareUpdate
        } else {
            Self::Custom(action.to_string())
        }
    }
}

/// A command together with the actor who issued it.
///
/// # Examples
///
/// ```
/// use gate_relay::types::{CommandEncoding, CommandEnvelope};
///
/// let envelope = CommandEnvelope::new("ABRIR_PORTAO_AGORA", "Ana", "iPhone Web");
/// assert_eq!(
///     envelope.encode(CommandEncoding::Attributed),
///     "ABRIR_PORTAO_AGORA|Ana|iPhone Web"
/// );
///
/// let parsed = CommandEnvelope::parse("ABRIR_PORTAO_AGORA|Ana|iPhone Web").unwrap();
/// assert_eq!(parsed.actor_name, "Ana");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// The action token.
    pub action: String,
    /// Display name of whoever issued the command.
    pub actor_name: String,
    /// Client device class (e.g. `Android Web`).
    pub actor_device_class: String,
}

impl CommandEnvelope {
    /// Creates a new envelope.
    #[must_use]
    pub fn new(
        action: impl Into<String>,
        actor_name: impl Into<String>,
        actor_device_class: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            actor_name: actor_name.into(),
            actor_device_class: actor_device_class.into(),
        }
    }

    /// Parses an attributed payload.
    ///
    /// Fields beyond the third are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MalformedCommand`] if the payload has fewer than
    /// three fields.
    pub fn parse(payload: &str) -> Result<Self, ParseError> {
        let mut fields = payload.split(SEPARATOR);
        match (fields.next(), fields.next(), fields.next()) {
            (Some(action), Some(actor_name), Some(actor_device_class)) => {
                Ok(Self::new(action.trim(), actor_name, actor_device_class))
            }
            _ => Err(ParseError::MalformedCommand {
                fields: payload.split(SEPARATOR).count(),
                payload: payload.to_string(),
            }),
        }
    }

    /// Encodes the envelope for the wire.
    #[must_use]
    pub fn encode(&self, encoding: CommandEncoding) -> String {
        match encoding {
            CommandEncoding::Attributed => format!(
                "{}{SEPARATOR}{}{SEPARATOR}{}",
                self.action, self.actor_name, self.actor_device_class
            ),
            CommandEncoding::Plain => self.action.clone(),
        }
    }

    /// Returns the attribution label for this command.
    #[must_use]
    pub fn origin_label(&self) -> String {
        format!("{} via {}", self.actor_name, self.actor_device_class)
    }
}

impl fmt::Display for CommandEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode(CommandEncoding::Attributed))
    }
}
