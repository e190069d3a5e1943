// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT backbone.
//!
//! A single persistent broker connection. Inbound publishes on the
//! subscribed topics are forwarded, in delivery order, to an mpsc channel.
//! The connection re-subscribes on every `ConnAck` and keeps polling with
//! backoff after errors, so a broker restart is survived without
//! intervention.
//!
//! # Examples
//!
//! ```no_run
//! use gate_relay::protocol::{Backbone, MqttBackbone};
//!
//! # async fn example() -> gate_relay::Result<()> {
//! let (backbone, mut inbound) = MqttBackbone::builder()
//!     .url("mqtt://192.168.1.50:1883")
//!     .credentials("user", "password")
//!     .subscribe(["projeto_LG/casa/portao", "projeto_LG/casa/portao/status"])
//!     .build()
//!     .await?;
//!
//! backbone.publish("projeto_LG/casa/portao", "ABRIR_PORTAO_AGORA|Ana|PC Windows")?;
//!
//! while let Some(message) = inbound.recv().await {
//!     println!("{} -> {}", message.topic, message.payload);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS, Transport};
use tokio::sync::{mpsc, oneshot};

use crate::config::ReconnectionPolicy;
use crate::error::ProtocolError;

use super::{Backbone, InboundMessage};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

/// Broker address parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    tls: bool,
}

/// Parses `mqtt://`, `tcp://`, `mqtts://` and `ssl://` URLs.
///
/// A bare `host[:port]` is treated as plain MQTT.
fn parse_mqtt_url(url: &str) -> Result<Endpoint, ProtocolError> {
    let (rest, tls) = if let Some(rest) = url
        .strip_prefix("mqtts://")
        .or_else(|| url.strip_prefix("ssl://"))
    {
        (rest, true)
    } else {
        let rest = url
            .strip_prefix("mqtt://")
            .or_else(|| url.strip_prefix("tcp://"))
            .unwrap_or(url);
        (rest, false)
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| ProtocolError::InvalidAddress(format!("Invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        let port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT };
        (rest.to_string(), port)
    };

    if host.is_empty() {
        return Err(ProtocolError::InvalidAddress(format!(
            "Missing host in MQTT URL: {url}"
        )));
    }

    Ok(Endpoint { host, port, tls })
}

/// Configuration for an MQTT backbone connection.
#[derive(Debug, Clone)]
struct MqttBackboneConfig {
    url: String,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
    reconnection: ReconnectionPolicy,
    topics: Vec<String>,
    inbound_buffer: usize,
}

impl Default for MqttBackboneConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            reconnection: ReconnectionPolicy::default(),
            topics: Vec::new(),
            inbound_buffer: 64,
        }
    }
}

/// A persistent MQTT broker connection.
///
/// `MqttBackbone` is cheaply cloneable (via `Arc`); all clones publish
/// through the same connection.
#[derive(Clone)]
pub struct MqttBackbone {
    inner: Arc<MqttBackboneInner>,
}

struct MqttBackboneInner {
    client: AsyncClient,
    endpoint: Endpoint,
    connected: AtomicBool,
}

impl MqttBackbone {
    /// Creates a new builder for configuring the connection.
    #[must_use]
    pub fn builder() -> MqttBackboneBuilder {
        MqttBackboneBuilder::default()
    }

    /// Returns whether the broker connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.endpoint.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.endpoint.port
    }

    /// Disconnects from the broker and stops the event loop.
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!(
            host = %self.inner.endpoint.host,
            port = %self.inner.endpoint.port,
            "Disconnecting from MQTT broker"
        );
        self.inner
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt)?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }
}

impl Backbone for MqttBackbone {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            tracing::warn!(topic = %topic, "Publishing while disconnected, message may be lost");
        }
        self.inner
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .map_err(ProtocolError::Mqtt)
    }
}

impl std::fmt::Debug for MqttBackbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBackbone")
            .field("host", &self.inner.endpoint.host)
            .field("port", &self.inner.endpoint.port)
            .field("tls", &self.inner.endpoint.tls)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for an [`MqttBackbone`].
#[derive(Debug, Default)]
pub struct MqttBackboneBuilder {
    config: MqttBackboneConfig,
}

impl MqttBackboneBuilder {
    /// Sets the broker URL (`mqtt://host:port`, `mqtts://host`, ...).
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the initial connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the backoff applied between reconnection attempts.
    #[must_use]
    pub fn reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.config.reconnection = policy;
        self
    }

    /// Adds topics subscribed on every (re)connection.
    #[must_use]
    pub fn subscribe<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Sets the capacity of the inbound message channel (default: 64).
    #[must_use]
    pub fn inbound_buffer(mut self, capacity: usize) -> Self {
        self.config.inbound_buffer = capacity.max(1);
        self
    }

    /// Connects to the broker.
    ///
    /// Returns the backbone and the receiver of inbound messages.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The URL is missing or invalid
    /// - The first connection attempt fails
    /// - No `ConnAck` arrives within the connection timeout
    pub async fn build(
        self,
    ) -> Result<(MqttBackbone, mpsc::Receiver<InboundMessage>), ProtocolError> {
        if self.config.url.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker URL is required".to_string(),
            ));
        }
        let endpoint = parse_mqtt_url(&self.config.url)?;

        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("gate_relay_{}_{}", std::process::id(), counter);

        let mut mqtt_options = MqttOptions::new(&client_id, &endpoint.host, endpoint.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }
        if endpoint.tls {
            mqtt_options.set_transport(Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let backbone = MqttBackbone {
            inner: Arc::new(MqttBackboneInner {
                client: client.clone(),
                endpoint: endpoint.clone(),
                connected: AtomicBool::new(false),
            }),
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_buffer);
        let (connack_tx, connack_rx) = oneshot::channel();

        tokio::spawn(handle_events(
            event_loop,
            backbone.clone(),
            self.config.topics,
            self.config.reconnection,
            inbound_tx,
            connack_tx,
        ));

        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!(
                    host = %endpoint.host,
                    port = %endpoint.port,
                    tls = endpoint.tls,
                    "Connected to MQTT broker"
                );
                Ok((backbone, inbound_rx))
            }
            Ok(Ok(Err(reason))) => Err(ProtocolError::ConnectionFailed(reason)),
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            )),
            Err(_) => Err(ProtocolError::ConnectionFailed(format!(
                "MQTT connection timeout after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

/// Drives the connection: subscribes on `ConnAck`, forwards publishes, and
/// backs off after errors.
async fn handle_events(
    mut event_loop: EventLoop,
    backbone: MqttBackbone,
    topics: Vec<String>,
    reconnection: ReconnectionPolicy,
    inbound_tx: mpsc::Sender<InboundMessage>,
    connack_tx: oneshot::Sender<Result<(), String>>,
) {
    use rumqttc::{Event, Outgoing, Packet};

    let mut connack_tx = Some(connack_tx);
    let mut attempt: u32 = 0;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                backbone.inner.connected.store(true, Ordering::Release);
                if attempt > 0 {
                    tracing::info!(attempts = attempt, "Reconnected to MQTT broker");
                }
                attempt = 0;

                for topic in &topics {
                    if let Err(e) = backbone
                        .inner
                        .client
                        .try_subscribe(topic.as_str(), QoS::AtLeastOnce)
                    {
                        tracing::warn!(topic = %topic, error = %e, "Failed to subscribe");
                    }
                }

                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Ok(payload) = String::from_utf8(publish.payload.to_vec()) else {
                    tracing::debug!(topic = %publish.topic, "Dropping non UTF-8 payload");
                    continue;
                };
                tracing::debug!(
                    topic = %publish.topic,
                    payload = %payload,
                    "MQTT message received"
                );
                let message = InboundMessage::new(publish.topic.clone(), payload);
                if inbound_tx.send(message).await.is_err() {
                    tracing::info!("Inbound receiver dropped, stopping MQTT event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker sent disconnect");
                backbone.inner.connected.store(false, Ordering::Release);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT client disconnecting");
                backbone.inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                backbone.inner.connected.store(false, Ordering::Release);

                // The first connection must succeed; later failures are retried
                if let Some(tx) = connack_tx.take() {
                    tracing::error!(error = %e, "MQTT connection failed");
                    let _ = tx.send(Err(e.to_string()));
                    break;
                }

                let delay = reconnection.delay_for_attempt(attempt);
                attempt = attempt.saturating_add(1);
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    "MQTT connection lost, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
