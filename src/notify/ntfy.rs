// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ntfy push delivery.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::error::ProtocolError;

use super::{Notification, PushSink};

/// Configuration for an ntfy push sink.
///
/// Messages are published as JSON to the server root, with the topic in the
/// body.
///
/// # Examples
///
/// ```
/// use gate_relay::notify::NtfyConfig;
/// use std::time::Duration;
///
/// let config = NtfyConfig::new("casa-portao")
///     .with_base_url("https://ntfy.example.org/")
///     .with_click_url("https://portao.example.org")
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.topic(), "casa-portao");
/// ```
#[derive(Debug, Clone)]
pub struct NtfyConfig {
    base_url: String,
    topic: String,
    click_url: Option<String>,
    priority: u8,
    timeout: Duration,
}

impl NtfyConfig {
    /// Public ntfy server.
    pub const DEFAULT_BASE_URL: &'static str = "https://ntfy.sh/";
    /// ntfy "default" priority.
    pub const DEFAULT_PRIORITY: u8 = 3;
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration publishing to `topic` on the public server.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            topic: topic.into(),
            click_url: None,
            priority: Self::DEFAULT_PRIORITY,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the server URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the URL opened when the notification is tapped.
    #[must_use]
    pub fn with_click_url(mut self, click_url: impl Into<String>) -> Self {
        self.click_url = Some(click_url.into());
        self
    }

    /// Sets the message priority (1 to 5).
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the server URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an [`NtfySink`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn into_sink(self) -> Result<NtfySink, ProtocolError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(NtfySink {
            client,
            config: self,
        })
    }
}

#[derive(Serialize)]
struct NtfyMessage<'a> {
    topic: &'a str,
    title: &'a str,
    message: &'a str,
    priority: u8,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    click: Option<&'a str>,
}

/// Push sink delivering notifications through an ntfy server.
///
/// [`PushSink::dispatch`] spawns the request on the current tokio runtime;
/// delivery errors are logged and dropped.
#[derive(Debug, Clone)]
pub struct NtfySink {
    client: Client,
    config: NtfyConfig,
}

impl NtfySink {
    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &NtfyConfig {
        &self.config
    }

    /// Publishes `notification` and waits for the server's answer.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the server rejects it.
    pub async fn send(&self, notification: &Notification) -> Result<(), ProtocolError> {
        let body = NtfyMessage {
            topic: &self.config.topic,
            title: &notification.title,
            message: &notification.message,
            priority: self.config.priority,
            tags: &notification.tags,
            click: self.config.click_url.as_deref(),
        };

        tracing::debug!(
            url = %self.config.base_url,
            topic = %self.config.topic,
            title = %notification.title,
            "Publishing push notification"
        );

        self.client
            .post(&self.config.base_url)
            .json(&body)
            .send()
            .await
            .map_err(ProtocolError::Http)?
            .error_for_status()
            .map_err(ProtocolError::Http)?;

        Ok(())
    }
}

impl PushSink for NtfySink {
    fn dispatch(&self, notification: Notification) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(title = %notification.title, "No runtime, push notification dropped");
            return;
        };

        let sink = self.clone();
        handle.spawn(async move {
            match sink.send(&notification).await {
                Ok(()) => {
                    tracing::info!(
                        device = %notification.device,
                        title = %notification.title,
                        "Push notification sent"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        device = %notification.device,
                        error = %e,
                        "Push notification failed"
                    );
                }
            }
        });
    }
}
