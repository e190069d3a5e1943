// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relay configuration.
//!
//! Settings are layered with `figment`, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`RelayConfig::default`])
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `GATE_RELAY_` (e.g. `GATE_RELAY_PORT`)
//! 4. The bare variables used by existing deployments: `PORT`, `APP_PASSWORD`,
//!    `MQTT_URL`, `MQTT_USER`, `MQTT_PASS`, `NTFY_TOPIC`
//!
//! # Examples
//!
//! ```
//! use gate_relay::config::RelayConfig;
//! use figment::{Figment, providers::{Format, Serialized, Toml}};
//!
//! let figment = Figment::from(Serialized::defaults(RelayConfig::default()))
//!     .merge(Toml::string(r#"
//!         app_password = "s3cret"
//!         pump = true
//!     "#));
//! let config = RelayConfig::from_figment(&figment).unwrap();
//! assert_eq!(config.device_profiles().len(), 2);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::CommandEncoding;

/// Prefix for relay-specific environment variables.
pub const ENV_PREFIX: &str = "GATE_RELAY_";

/// Unprefixed environment variables honoured for compatibility.
const LEGACY_ENV_KEYS: [&str; 6] = [
    "port",
    "app_password",
    "mqtt_url",
    "mqtt_user",
    "mqtt_pass",
    "ntfy_topic",
];

/// Keys whose environment values are taken verbatim.
///
/// `Env` parses values by shape, so a PIN such as `0123` would otherwise
/// arrive as the integer `123`.
const VERBATIM_ENV_KEYS: [&str; 5] = [
    "app_password",
    "mqtt_url",
    "mqtt_user",
    "mqtt_pass",
    "ntfy_topic",
];

/// Reads the [`VERBATIM_ENV_KEYS`] under `prefix` as plain strings.
///
/// Unset, empty and non-UTF-8 variables are skipped.
fn verbatim_env(prefix: &str) -> Serialized<BTreeMap<&'static str, String>> {
    let values = VERBATIM_ENV_KEYS
        .iter()
        .filter_map(|key| {
            let var = format!("{prefix}{}", key.to_ascii_uppercase());
            match std::env::var(&var) {
                Ok(value) if !value.is_empty() => Some((*key, value)),
                _ => None,
            }
        })
        .collect();
    Serialized::defaults(values)
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the HTTP listener binds to.
    pub host: String,
    /// Port the HTTP listener binds to.
    pub port: u16,
    /// Shared secret checked on login.
    pub app_password: String,
    /// Broker URL (`mqtt://`, `mqtts://`, `tcp://` or `ssl://`).
    pub mqtt_url: String,
    /// Broker username.
    pub mqtt_user: Option<String>,
    /// Broker password.
    pub mqtt_pass: Option<String>,
    /// MQTT keep-alive interval in seconds.
    pub mqtt_keep_alive_secs: u64,
    /// How long to wait for the first broker acknowledgement at startup.
    pub mqtt_connect_timeout_secs: u64,
    /// First delay before polling the broker again after a connection error.
    pub reconnect_initial_delay_ms: u64,
    /// Upper bound for the reconnection backoff.
    pub reconnect_max_delay_ms: u64,
    /// Base URL of the ntfy server.
    pub ntfy_url: String,
    /// ntfy topic; push notifications are disabled when unset.
    pub ntfy_topic: Option<String>,
    /// URL opened when a notification is tapped.
    pub click_url: Option<String>,
    /// Minimum time between two push notifications for the same device.
    pub notification_interval_ms: u64,
    /// How long a command origin stays attributable.
    pub attribution_window_secs: u64,
    /// Per-subscriber buffer of pending live updates.
    pub subscriber_buffer: usize,
    /// Directory served as static web assets.
    pub static_dir: Option<PathBuf>,
    /// Adds the water pump preset to the device list.
    pub pump: bool,
    /// Controllable devices. The first one is the primary device.
    pub devices: Vec<DeviceProfile>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            app_password: String::new(),
            mqtt_url: "mqtt://localhost:1883".to_string(),
            mqtt_user: None,
            mqtt_pass: None,
            mqtt_keep_alive_secs: 30,
            mqtt_connect_timeout_secs: 10,
            reconnect_initial_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            ntfy_url: "https://ntfy.sh/".to_string(),
            ntfy_topic: None,
            click_url: None,
            notification_interval_ms: 1_000,
            attribution_window_secs: 40,
            subscriber_buffer: 64,
            static_dir: Some(PathBuf::from("public")),
            pump: false,
            devices: vec![DeviceProfile::gate()],
        }
    }
}

impl RelayConfig {
    /// Loads configuration from defaults, `path` (if it exists) and the
    /// environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed or validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&VERBATIM_ENV_KEYS))
            .merge(verbatim_env(ENV_PREFIX))
            .merge(Env::raw().only(&LEGACY_ENV_KEYS).ignore(&VERBATIM_ENV_KEYS))
            .merge(verbatim_env(""));
        Self::from_figment(&figment)
    }

    /// Extracts and validates a configuration from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns error if extraction or validation fails.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns error if the password is empty, no device is configured, a
    /// device name is empty or spans lines, a device uses the same token for
    /// both settled states, or two devices share a name or topic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_password.is_empty() {
            return Err(ConfigError::MissingPassword);
        }

        let profiles = self.device_profiles();
        if profiles.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        let mut names = HashSet::new();
        let mut topics = HashSet::new();
        for profile in &profiles {
            if profile.name.is_empty() {
                return Err(ConfigError::InvalidDevice(
                    "device name must not be empty".to_string(),
                ));
            }
            if profile.name.contains(['\n', '\r']) {
                return Err(ConfigError::InvalidDevice(format!(
                    "device name {:?} must not contain line breaks",
                    profile.name
                )));
            }
            if profile.opened_token == profile.closed_token {
                return Err(ConfigError::InvalidDevice(format!(
                    "device {} uses {} for both opened and closed",
                    profile.name, profile.opened_token
                )));
            }
            if !names.insert(profile.name.as_str()) {
                return Err(ConfigError::InvalidDevice(format!(
                    "duplicate device name {}",
                    profile.name
                )));
            }
            for topic in [&profile.command_topic, &profile.status_topic] {
                if !topics.insert(topic.as_str()) {
                    return Err(ConfigError::InvalidDevice(format!(
                        "topic {topic} is used more than once"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns the configured devices, including the pump preset if enabled.
    #[must_use]
    pub fn device_profiles(&self) -> Vec<DeviceProfile> {
        let mut profiles = self.devices.clone();
        if self.pump && !profiles.iter().any(|p| p.name == DeviceProfile::PUMP) {
            profiles.push(DeviceProfile::pump());
        }
        profiles
    }

    /// Returns the minimum interval between notifications.
    #[must_use]
    pub fn notification_interval(&self) -> Duration {
        Duration::from_millis(self.notification_interval_ms)
    }

    /// Returns the attribution expiry window.
    #[must_use]
    pub fn attribution_window(&self) -> Duration {
        Duration::from_secs(self.attribution_window_secs)
    }

    /// Returns the broker credentials, if both parts are set.
    #[must_use]
    pub fn mqtt_credentials(&self) -> Option<(&str, &str)> {
        match (&self.mqtt_user, &self.mqtt_pass) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    /// Returns the reconnection policy for the broker connection.
    #[must_use]
    pub fn reconnection(&self) -> ReconnectionPolicy {
        ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_millis(self.reconnect_initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.reconnect_max_delay_ms))
    }
}

/// Static description of a controllable device.
///
/// Omitted fields in a TOML `[[devices]]` table fall back to the gate preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Symbolic device name used by the API (`dispositivo`).
    pub name: String,
    /// Topic commands are published to and echoed on.
    pub command_topic: String,
    /// Topic the device reports its status on.
    pub status_topic: String,
    /// Wire format the firmware expects on the command topic.
    pub encoding: CommandEncoding,
    /// Action that actuates the device.
    pub open_action: String,
    /// Action that triggers a firmware update.
    pub update_action: String,
    /// Status token for the settled open state.
    pub opened_token: String,
    /// Status token for the settled closed state.
    pub closed_token: String,
    /// Push title when the device opens.
    pub opened_title: String,
    /// Push body when the device opens, before the attribution line.
    pub opened_message: String,
    /// ntfy tags when the device opens.
    pub opened_tags: Vec<String>,
    /// Push title when the device closes.
    pub closed_title: String,
    /// Push body when the device closes.
    pub closed_message: String,
    /// ntfy tags when the device closes.
    pub closed_tags: Vec<String>,
}

impl DeviceProfile {
    /// Name of the gate preset.
    pub const GATE: &'static str = "gate";
    /// Name of the pump preset.
    pub const PUMP: &'static str = "pump";

    /// The gate controller preset.
    #[must_use]
    pub fn gate() -> Self {
        Self {
            name: Self::GATE.to_string(),
            command_topic: "projeto_LG/casa/portao".to_string(),
            status_topic: "projeto_LG/casa/portao/status".to_string(),
            encoding: CommandEncoding::Attributed,
            open_action: "ABRIR_PORTAO_AGORA".to_string(),
            update_action: "ATUALIZAR_FIRMWARE".to_string(),
            opened_token: "ESTADO_REAL_ABERTO".to_string(),
            closed_token: "ESTADO_REAL_FECHADO".to_string(),
            opened_title: "Portão Aberto ⚠️".to_string(),
            opened_message: "O portão acabou de abrir.".to_string(),
            opened_tags: vec!["warning".to_string(), "door".to_string()],
            closed_title: "Portão Fechado 🔒".to_string(),
            closed_message: "O portão foi fechado.".to_string(),
            closed_tags: vec!["white_check_mark".to_string(), "lock".to_string()],
        }
    }

    /// The water pump preset.
    #[must_use]
    pub fn pump() -> Self {
        Self {
            name: Self::PUMP.to_string(),
            command_topic: "projeto_LG/casa/bomba".to_string(),
            status_topic: "projeto_LG/casa/bomba/status".to_string(),
            encoding: CommandEncoding::Plain,
            open_action: "LIGAR_BOMBA".to_string(),
            update_action: "ATUALIZAR_FIRMWARE".to_string(),
            opened_token: "BOMBA_LIGADA".to_string(),
            closed_token: "BOMBA_DESLIGADA".to_string(),
            opened_title: "Bomba Ligada 💧".to_string(),
            opened_message: "A bomba d'água foi ligada.".to_string(),
            opened_tags: vec!["droplet".to_string()],
            closed_title: "Bomba Desligada".to_string(),
            closed_message: "A bomba d'água foi desligada.".to_string(),
            closed_tags: vec!["white_check_mark".to_string()],
        }
    }

    /// Sets the device name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the command and status topics.
    #[must_use]
    pub fn with_topics(
        mut self,
        command_topic: impl Into<String>,
        status_topic: impl Into<String>,
    ) -> Self {
        self.command_topic = command_topic.into();
        self.status_topic = status_topic.into();
        self
    }

    /// Sets the command encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: CommandEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::gate()
    }
}

/// Backoff policy for reconnecting to the broker.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gate_relay::config::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::new()
///     .with_initial_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(30));
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    /// Initial delay between retry attempts.
    pub initial_delay: Duration,
    /// Maximum delay between retry attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,
}

impl ReconnectionPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial delay between retry attempts.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retry attempts.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before the given retry attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        // delay_ms is non-negative; saturating cast caps it
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
