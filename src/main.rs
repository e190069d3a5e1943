// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use gate_relay::api;
use gate_relay::config::RelayConfig;
use gate_relay::notify::{NtfyConfig, PushSink};
use gate_relay::protocol::MqttBackbone;
use gate_relay::relay::Relay;

const DEFAULT_LOG_FILTER: &str = "gate_relay=info,tower_http=info,warn";

/// How long open event streams may delay shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "gate-relay", version)]
#[command(about = "Relay between the gate web page, the MQTT broker and ntfy")]
struct Cli {
    /// Configuration file (TOML); ignored if missing
    #[arg(short, long, default_value = "gate-relay.toml")]
    config: PathBuf,

    /// Port for the web server (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "gate_relay=debug,tower_http=debug,info"
    } else {
        DEFAULT_LOG_FILTER
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();
}

fn push_sink(config: &RelayConfig) -> anyhow::Result<Option<Arc<dyn PushSink>>> {
    let Some(topic) = config.ntfy_topic.as_deref().filter(|topic| !topic.is_empty()) else {
        warn!("ntfy_topic not set, push notifications disabled");
        return Ok(None);
    };

    let mut ntfy = NtfyConfig::new(topic).with_base_url(config.ntfy_url.as_str());
    if let Some(click_url) = &config.click_url {
        ntfy = ntfy.with_click_url(click_url.as_str());
    }
    let sink = ntfy.into_sink().context("Failed to create ntfy client")?;
    info!(topic = %topic, url = %config.ntfy_url, "Push notifications enabled");
    Ok(Some(Arc::new(sink)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = RelayConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let topics: Vec<String> = config
        .device_profiles()
        .into_iter()
        .flat_map(|profile| [profile.command_topic, profile.status_topic])
        .collect();

    let mut backbone = MqttBackbone::builder()
        .url(config.mqtt_url.as_str())
        .keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs))
        .connection_timeout(Duration::from_secs(config.mqtt_connect_timeout_secs))
        .reconnection(config.reconnection())
        .subscribe(topics);
    if let Some((user, pass)) = config.mqtt_credentials() {
        backbone = backbone.credentials(user, pass);
    }
    let (backbone, inbound) = backbone
        .build()
        .await
        .with_context(|| format!("Failed to connect to MQTT broker at {}", config.mqtt_url))?;

    let sink = push_sink(&config)?;
    let relay = Arc::new(Relay::new(&config, Arc::new(backbone.clone()), sink)?);
    let inbound_task = relay.spawn_inbound(inbound);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "Gate relay listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = axum::serve(listener, api::router(relay)).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let mut server = tokio::spawn(serve.into_future());

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")?.context("Server error")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Received shutdown signal, cleaning up...");
            let _ = shutdown_tx.send(());
            // Event streams never end on their own
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
                warn!("Open event streams did not close in time");
                server.abort();
            }
        }
    }

    if let Err(e) = backbone.disconnect().await {
        warn!(error = %e, "Failed to disconnect from MQTT broker");
    }
    inbound_task.abort();
    info!("Gate relay stopped");
    Ok(())
}
