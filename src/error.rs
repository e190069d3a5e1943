// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the relay.
//!
//! The hierarchy mirrors how failures are handled at runtime: authentication
//! errors are returned to HTTP callers, malformed backbone payloads are logged
//! and dropped, transport failures are logged and never retried by the caller,
//! and configuration errors abort startup.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication or session lookup failed.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Communication with the backbone or the push sink failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A backbone payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The relay configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The named device is not configured.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}

/// Errors returned to callers of privileged operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The supplied password does not match the configured secret.
    #[error("invalid password")]
    InvalidPassword,

    /// The bearer token is missing or does not name a live session.
    #[error("missing or unknown session token")]
    InvalidSession,
}

/// Errors related to the messaging backbone and the push sink.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request to the push sink failed.
    #[cfg(feature = "ntfy")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker URL or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Errors related to parsing backbone payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A pipe-delimited command payload has too few fields.
    #[error("malformed command payload {payload:?}: expected at least 3 fields, got {fields}")]
    MalformedCommand {
        /// Number of fields found.
        fields: usize,
        /// The raw payload.
        payload: String,
    },
}

/// Errors detected while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// No application password was configured.
    #[error("app_password must be set")]
    MissingPassword,

    /// No devices are configured.
    #[error("at least one device must be configured")]
    NoDevices,

    /// A device profile is invalid or clashes with another one.
    #[error("invalid device configuration: {0}")]
    InvalidDevice(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_command_display() {
        let err = ParseError::MalformedCommand {
            fields: 2,
            payload: "ABRIR|Ana".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "malformed command payload \"ABRIR|Ana\": expected at least 3 fields, got 2"
        );
    }

    #[test]
    fn error_from_auth_error() {
        let err: Error = AuthError::InvalidSession.into();
        assert!(matches!(err, Error::Auth(AuthError::InvalidSession)));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidDevice("duplicate name gate".to_string());
        assert_eq!(
            err.to_string(),
            "invalid device configuration: duplicate name gate"
        );
    }
}
