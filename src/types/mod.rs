// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message vocabulary shared by devices and the relay.

mod command;
mod status;

pub use command::{CommandAction, CommandEncoding, CommandEnvelope};
pub use status::{AWAITING_REPORT, DeviceStatus, FIRMWARE_UPDATING};
