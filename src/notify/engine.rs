// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Notification decisions for inbound status reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::attribution::{AttributionTracker, DEFAULT_WINDOW};
use crate::broadcast::{Broadcaster, StateUpdate};
use crate::config::DeviceProfile;
use crate::types::DeviceStatus;

use super::{Notification, PushSink};

/// Origin reported when an opening was not preceded by a tracked command.
pub const REMOTE_CONTROL_ORIGIN: &str = "Controle Remoto";

/// Default minimum interval between two notifications for one device.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of processing one status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A non-terminal status; forwarded to live subscribers only.
    Progress(DeviceStatus),
    /// Same terminal state as the last notification.
    Duplicate,
    /// A new terminal state, but too soon after the last notification.
    Debounced,
    /// A notification was composed and handed to the sink.
    Notified(Notification),
    /// The report named a device that is not configured.
    UnknownDevice,
}

/// Per-device notification bookkeeping.
#[derive(Debug, Default)]
struct NotifyState {
    last_notified: Option<DeviceStatus>,
    last_notified_at: Option<Instant>,
}

#[derive(Debug)]
struct DeviceRecord {
    profile: DeviceProfile,
    attribution: AttributionTracker,
    state: Mutex<NotifyState>,
}

/// Turns raw status reports into live updates and push notifications.
///
/// Every report is broadcast to live subscribers. Only terminal reports are
/// considered for a push notification, and those are suppressed when they
/// repeat the last notified state or arrive within the minimum interval of
/// the previous notification. Live updates and notifications are suppressed
/// independently.
///
/// Each device has its own [`AttributionTracker`]; an "opened" notification
/// credits the pending origin of that device, or [`REMOTE_CONTROL_ORIGIN`]
/// when there is none.
///
/// # Examples
///
/// ```
/// use gate_relay::broadcast::Broadcaster;
/// use gate_relay::config::DeviceProfile;
/// use gate_relay::notify::{Decision, NotificationEngine};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broadcaster = Broadcaster::new(["gate"]);
/// let engine = NotificationEngine::builder(broadcaster.clone())
///     .device(DeviceProfile::gate())
///     .build();
///
/// let decision = engine.on_status_observed("gate", "ESTADO_REAL_FECHADO");
/// assert!(matches!(decision, Decision::Notified(_)));
///
/// // The repeat is forwarded live but not notified again
/// let decision = engine.on_status_observed("gate", "ESTADO_REAL_FECHADO");
/// assert_eq!(decision, Decision::Duplicate);
/// assert_eq!(broadcaster.current_state("gate").as_deref(), Some("ESTADO_REAL_FECHADO"));
/// # }
/// ```
pub struct NotificationEngine {
    devices: HashMap<String, DeviceRecord>,
    broadcaster: Broadcaster,
    sink: Option<Arc<dyn PushSink>>,
    min_interval: Duration,
}

impl NotificationEngine {
    /// Creates a builder that broadcasts through `broadcaster`.
    #[must_use]
    pub fn builder(broadcaster: Broadcaster) -> NotificationEngineBuilder {
        NotificationEngineBuilder {
            broadcaster,
            profiles: Vec::new(),
            sink: None,
            min_interval: DEFAULT_MIN_INTERVAL,
            attribution_window: DEFAULT_WINDOW,
        }
    }

    /// Returns the profile of a configured device.
    #[must_use]
    pub fn profile(&self, device: &str) -> Option<&DeviceProfile> {
        self.devices.get(device).map(|record| &record.profile)
    }

    /// Returns the attribution tracker of a configured device.
    #[must_use]
    pub fn attribution(&self, device: &str) -> Option<&AttributionTracker> {
        self.devices.get(device).map(|record| &record.attribution)
    }

    /// Returns the minimum interval between notifications.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Processes one status report for `device`.
    pub fn on_status_observed(&self, device: &str, raw_state: &str) -> Decision {
        let Some(record) = self.devices.get(device) else {
            tracing::warn!(device = %device, state = %raw_state, "Status for unknown device");
            return Decision::UnknownDevice;
        };

        let raw_state = raw_state.trim();
        self.broadcaster.broadcast(StateUpdate::new(device, raw_state));

        let status = DeviceStatus::classify(raw_state, &record.profile);
        if !status.is_terminal() {
            tracing::debug!(device = %device, status = %status, "Non-terminal status");
            return Decision::Progress(status);
        }

        let notification = {
            let mut state = record.state.lock();

            if state.last_notified.as_ref() == Some(&status) {
                tracing::debug!(device = %device, status = %status, "Already notified");
                return Decision::Duplicate;
            }

            let now = Instant::now();
            if let Some(last) = state.last_notified_at
                && now.duration_since(last) < self.min_interval
            {
                tracing::info!(
                    device = %device,
                    status = %status,
                    elapsed_ms = now.duration_since(last).as_millis(),
                    "Notification debounced"
                );
                return Decision::Debounced;
            }

            let Some(notification) = compose(record, &status) else {
                return Decision::Progress(status);
            };
            state.last_notified = Some(status);
            state.last_notified_at = Some(now);
            notification
        };

        match &self.sink {
            Some(sink) => {
                tracing::info!(device = %device, title = %notification.title, "Notifying");
                sink.dispatch(notification.clone());
            }
            None => {
                tracing::debug!(device = %device, "No push sink configured");
            }
        }

        Decision::Notified(notification)
    }
}

impl std::fmt::Debug for NotificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationEngine")
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .field("has_sink", &self.sink.is_some())
            .field("min_interval", &self.min_interval)
            .finish_non_exhaustive()
    }
}

/// Builds the notification text for a terminal status.
fn compose(record: &DeviceRecord, status: &DeviceStatus) -> Option<Notification> {
    let profile = &record.profile;
    let notification = match status {
        DeviceStatus::Opened => {
            let origin = match record.attribution.consume_origin() {
                Some(label) => format!("\n📱 Acionado por: {label}"),
                None => format!("\n🎮 Acionado por: {REMOTE_CONTROL_ORIGIN}"),
            };
            Notification {
                device: profile.name.clone(),
                title: profile.opened_title.clone(),
                message: format!("{}{origin}", profile.opened_message),
                tags: profile.opened_tags.clone(),
            }
        }
        DeviceStatus::Closed => Notification {
            device: profile.name.clone(),
            title: profile.closed_title.clone(),
            message: profile.closed_message.clone(),
            tags: profile.closed_tags.clone(),
        },
        DeviceStatus::AwaitingReport
        | DeviceStatus::FirmwareUpdating
        | DeviceStatus::Unknown(_) => return None,
    };
    Some(notification)
}

/// Builder for [`NotificationEngine`].
pub struct NotificationEngineBuilder {
    broadcaster: Broadcaster,
    profiles: Vec<DeviceProfile>,
    sink: Option<Arc<dyn PushSink>>,
    min_interval: Duration,
    attribution_window: Duration,
}

impl NotificationEngineBuilder {
    /// Adds a device.
    #[must_use]
    pub fn device(mut self, profile: DeviceProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Adds several devices.
    #[must_use]
    pub fn devices(mut self, profiles: impl IntoIterator<Item = DeviceProfile>) -> Self {
        self.profiles.extend(profiles);
        self
    }

    /// Sets the push sink. Without one, decisions are still made and logged.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn PushSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the minimum interval between notifications (default: 1 second).
    #[must_use]
    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Sets the attribution window (default: 40 seconds).
    #[must_use]
    pub fn attribution_window(mut self, window: Duration) -> Self {
        self.attribution_window = window;
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> NotificationEngine {
        let window = self.attribution_window;
        let devices = self
            .profiles
            .into_iter()
            .map(|profile| {
                let record = DeviceRecord {
                    attribution: AttributionTracker::new(window),
                    state: Mutex::new(NotifyState::default()),
                    profile,
                };
                (record.profile.name.clone(), record)
            })
            .collect();

        NotificationEngine {
            devices,
            broadcaster: self.broadcaster,
            sink: self.sink,
            min_interval: self.min_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Notification>>);

    impl RecordingSink {
        fn titles(&self) -> Vec<String> {
            self.0.lock().iter().map(|n| n.title.clone()).collect()
        }

        fn messages(&self) -> Vec<String> {
            self.0.lock().iter().map(|n| n.message.clone()).collect()
        }
    }

    impl PushSink for RecordingSink {
        fn dispatch(&self, notification: Notification) {
            self.0.lock().push(notification);
        }
    }

    const OPENED: &str = "ESTADO_REAL_ABERTO";
    const CLOSED: &str = "ESTADO_REAL_FECHADO";

    fn engine() -> (NotificationEngine, Arc<RecordingSink>, Broadcaster) {
        let broadcaster = Broadcaster::new(["gate", "pump"]);
        let sink = Arc::new(RecordingSink::default());
        let engine = NotificationEngine::builder(broadcaster.clone())
            .device(DeviceProfile::gate())
            .device(DeviceProfile::pump())
            .sink(sink.clone())
            .build();
        (engine, sink, broadcaster)
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_terminal_state_notifies_once() {
        let (engine, sink, _) = engine();

        assert!(matches!(
            engine.on_status_observed("gate", CLOSED),
            Decision::Notified(_)
        ));
        wait(5_000).await;
        assert_eq!(engine.on_status_observed("gate", CLOSED), Decision::Duplicate);
        wait(5_000).await;
        assert_eq!(engine.on_status_observed("gate", CLOSED), Decision::Duplicate);

        assert_eq!(sink.titles(), vec!["Portão Fechado 🔒"]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_transition_within_interval_is_debounced() {
        let (engine, sink, _) = engine();

        engine.on_status_observed("gate", OPENED);
        wait(500).await;
        assert_eq!(engine.on_status_observed("gate", CLOSED), Decision::Debounced);

        assert_eq!(sink.titles(), vec!["Portão Aberto ⚠️"]);
    }

    #[tokio::test(start_paused = true)]
    async fn transition_after_interval_is_notified() {
        let (engine, sink, _) = engine();

        engine.on_status_observed("gate", OPENED);
        wait(1_000).await;
        engine.on_status_observed("gate", CLOSED);

        assert_eq!(sink.titles(), vec!["Portão Aberto ⚠️", "Portão Fechado 🔒"]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_state_is_notified_when_it_recurs_later() {
        let (engine, sink, _) = engine();

        engine.on_status_observed("gate", OPENED);
        wait(500).await;
        engine.on_status_observed("gate", CLOSED);
        wait(2_000).await;
        // Last notified state is still "opened", so "closed" is new
        assert!(matches!(
            engine.on_status_observed("gate", CLOSED),
            Decision::Notified(_)
        ));

        assert_eq!(sink.titles().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn opening_credits_recorded_origin_once() {
        let (engine, sink, _) = engine();
        engine
            .attribution("gate")
            .unwrap()
            .record_command_origin("Ana (iPhone)");

        engine.on_status_observed("gate", OPENED);
        wait(2_000).await;
        engine.on_status_observed("gate", CLOSED);
        wait(2_000).await;
        engine.on_status_observed("gate", OPENED);

        let messages = sink.messages();
        assert_eq!(
            messages[0],
            "O portão acabou de abrir.\n📱 Acionado por: Ana (iPhone)"
        );
        assert_eq!(
            messages[2],
            "O portão acabou de abrir.\n🎮 Acionado por: Controle Remoto"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_origin_falls_back_to_remote_control() {
        let (engine, sink, _) = engine();
        engine
            .attribution("gate")
            .unwrap()
            .record_command_origin("Ana (iPhone)");

        wait(41_000).await;
        engine.on_status_observed("gate", OPENED);

        assert!(sink.messages()[0].ends_with("Acionado por: Controle Remoto"));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_never_consumes_origin() {
        let (engine, sink, _) = engine();
        engine
            .attribution("gate")
            .unwrap()
            .record_command_origin("Ana via Android Web");

        engine.on_status_observed("gate", CLOSED);
        assert_eq!(sink.messages()[0], "O portão foi fechado.");
        assert!(engine.attribution("gate").unwrap().is_pending());

        wait(10_000).await;
        engine.on_status_observed("gate", OPENED);
        assert!(sink.messages()[1].ends_with("Acionado por: Ana via Android Web"));
    }

    #[tokio::test(start_paused = true)]
    async fn only_settled_states_compose_a_notification() {
        let (engine, _, _) = engine();
        let record = &engine.devices["gate"];
        record.attribution.record_command_origin("Ana via iPhone Web");

        for status in [
            DeviceStatus::AwaitingReport,
            DeviceStatus::FirmwareUpdating,
            DeviceStatus::Unknown("MOTOR_TRAVADO".to_string()),
        ] {
            assert!(compose(record, &status).is_none(), "{status}");
        }
        assert!(record.attribution.is_pending());

        let closed = compose(record, &DeviceStatus::Closed).unwrap();
        assert_eq!(closed.title, "Portão Fechado 🔒");
        assert!(record.attribution.is_pending());

        let opened = compose(record, &DeviceStatus::Opened).unwrap();
        assert!(opened.message.ends_with("Acionado por: Ana via iPhone Web"));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_broadcast_but_never_notified() {
        let (engine, sink, broadcaster) = engine();
        let mut live = broadcaster.subscribe();
        let _ = live.try_recv();
        let _ = live.try_recv();

        let decision = engine.on_status_observed("gate", "STATUS_ATUALIZANDO_SISTEMA");
        assert_eq!(decision, Decision::Progress(DeviceStatus::FirmwareUpdating));

        let decision = engine.on_status_observed("gate", "ERRO_SENSOR");
        assert_eq!(
            decision,
            Decision::Progress(DeviceStatus::Unknown("ERRO_SENSOR".to_string()))
        );

        assert!(sink.titles().is_empty());
        assert_eq!(live.try_recv().unwrap().state, "STATUS_ATUALIZANDO_SISTEMA");
        assert_eq!(live.try_recv().unwrap().state, "ERRO_SENSOR");
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_reports_are_still_broadcast() {
        let (engine, _, broadcaster) = engine();
        engine.on_status_observed("gate", CLOSED);

        let mut live = broadcaster.subscribe();
        let _ = live.try_recv();
        let _ = live.try_recv();

        engine.on_status_observed("gate", CLOSED);
        engine.on_status_observed("gate", OPENED);

        assert_eq!(live.try_recv().unwrap().state, CLOSED);
        assert_eq!(live.try_recv().unwrap().state, OPENED);
        assert_eq!(broadcaster.current_state("gate").as_deref(), Some(OPENED));
    }

    #[tokio::test(start_paused = true)]
    async fn devices_are_debounced_independently() {
        let (engine, sink, _) = engine();

        engine.on_status_observed("gate", OPENED);
        engine.on_status_observed("pump", "BOMBA_LIGADA");

        assert_eq!(sink.titles(), vec!["Portão Aberto ⚠️", "Bomba Ligada 💧"]);
    }

    #[tokio::test(start_paused = true)]
    async fn attribution_is_per_device() {
        let (engine, sink, _) = engine();
        engine
            .attribution("gate")
            .unwrap()
            .record_command_origin("Ana via iPhone Web");

        engine.on_status_observed("pump", "BOMBA_LIGADA");
        engine.on_status_observed("gate", OPENED);

        let messages = sink.messages();
        assert!(messages[0].ends_with("Controle Remoto"));
        assert!(messages[1].ends_with("Ana via iPhone Web"));
    }

    #[test]
    fn unknown_device_is_ignored() {
        let (engine, sink, broadcaster) = engine();
        assert_eq!(
            engine.on_status_observed("garage", OPENED),
            Decision::UnknownDevice
        );
        assert!(sink.titles().is_empty());
        assert_eq!(broadcaster.current_state("garage"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn decisions_are_made_without_sink() {
        let broadcaster = Broadcaster::new(["gate"]);
        let engine = NotificationEngine::builder(broadcaster)
            .device(DeviceProfile::gate())
            .build();

        assert!(matches!(
            engine.on_status_observed("gate", OPENED),
            Decision::Notified(_)
        ));
        assert_eq!(engine.on_status_observed("gate", OPENED), Decision::Duplicate);
    }

    #[tokio::test(start_paused = true)]
    async fn min_interval_is_configurable() {
        let broadcaster = Broadcaster::new(["gate"]);
        let engine = NotificationEngine::builder(broadcaster)
            .device(DeviceProfile::gate())
            .min_interval(Duration::from_secs(3))
            .build();

        engine.on_status_observed("gate", OPENED);
        wait(2_000).await;
        assert_eq!(engine.on_status_observed("gate", CLOSED), Decision::Debounced);
        wait(1_000).await;
        assert!(matches!(
            engine.on_status_observed("gate", CLOSED),
            Decision::Notified(_)
        ));
    }
}
