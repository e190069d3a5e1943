// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device status vocabulary.
//!
//! Devices report their state on a status topic as a bare token. The two
//! terminal tokens differ per device and come from its
//! [`DeviceProfile`](crate::config::DeviceProfile); the remaining tokens are
//! shared by all firmware builds.

use std::fmt;

use crate::config::DeviceProfile;

/// Token reported before a device has published its first status.
pub const AWAITING_REPORT: &str = "AGUARDANDO_ATUALIZACAO";

/// Token reported while a device downloads and flashes new firmware.
pub const FIRMWARE_UPDATING: &str = "STATUS_ATUALIZANDO_SISTEMA";

/// A classified status report.
///
/// # Examples
///
/// ```
/// use gate_relay::config::DeviceProfile;
/// use gate_relay::types::DeviceStatus;
///
/// let gate = DeviceProfile::gate();
/// assert_eq!(DeviceStatus::classify("ESTADO_REAL_ABERTO", &gate), DeviceStatus::Opened);
/// assert!(DeviceStatus::classify("ESTADO_REAL_FECHADO", &gate).is_terminal());
/// assert!(!DeviceStatus::classify("MOTOR_TRAVADO", &gate).is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// No report has been received yet.
    AwaitingReport,
    /// The device settled in its open (or on) position.
    Opened,
    /// The device settled in its closed (or off) position.
    Closed,
    /// The device is applying a firmware update.
    FirmwareUpdating,
    /// Any other token, forwarded to live subscribers as-is.
    Unknown(String),
}

impl DeviceStatus {
    /// Classifies a raw status token for the given device.
    #[must_use]
    pub fn classify(raw: &str, profile: &DeviceProfile) -> Self {
        let raw = raw.trim();
        if raw == profile.opened_token {
            Self::Opened
        } else if raw == profile.closed_token {
            Self::Closed
        } else if raw == AWAITING_REPORT {
            Self::AwaitingReport
        } else if raw == FIRMWARE_UPDATING {
            Self::FirmwareUpdating
        } else {
            Self::Unknown(raw.to_string())
        }
    }

    /// Returns `true` for the settled open/closed states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Opened | Self::Closed)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingReport => f.write_str("awaiting report"),
            Self::Opened => f.write_str("opened"),
            Self::Closed => f.write_str("closed"),
            Self::FirmwareUpdating => f.write_str("firmware updating"),
            Self::Unknown(token) => write!(f, "unknown ({token})"),
        }
    }
}
