// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::DeviceProfile;
use crate::relay::Relay;

use super::{Actor, ApiError, auth::bearer_token};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginRequest {
    password: String,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActuateRequest {
    dispositivo: Option<String>,
    comando_customizado: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateRequest {
    dispositivo: Option<String>,
}

/// Parses an optional JSON body; an empty body is the default request.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Resolves the requested device, defaulting to the primary one.
fn target_device<'a>(
    relay: &'a Relay,
    requested: Option<&str>,
) -> Result<&'a DeviceProfile, ApiError> {
    let name = requested
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(relay.primary_device());
    relay
        .profile(name)
        .ok_or_else(|| ApiError::UnknownDevice(name.to_string()))
}

/// Publishes a command; backbone failures are logged, never returned.
fn publish(relay: &Relay, device: &str, action: &str, actor: &Actor) {
    if let Err(e) = relay
        .gateway()
        .publish_command(device, action, &actor.name, actor.device_class)
    {
        tracing::error!(device = %device, action = %action, error = %e, "Command publish failed");
    }
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub(super) async fn login(
    State(relay): State<Arc<Relay>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: LoginRequest = parse_body(&body)?;
    let token = relay
        .sessions()
        .create_session(&request.password, request.name.as_deref())?;
    Ok(Json(json!({ "success": true, "token": token.as_str() })))
}

pub(super) async fn logout(State(relay): State<Arc<Relay>>, headers: HeaderMap) -> Json<Value> {
    if let Some(token) = bearer_token(&headers) {
        relay.sessions().destroy_session(token);
    }
    success()
}

pub(super) async fn actuate(
    State(relay): State<Arc<Relay>>,
    actor: Actor,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: ActuateRequest = parse_body(&body)?;
    let profile = target_device(&relay, request.dispositivo.as_deref())?;
    let action = request
        .comando_customizado
        .as_deref()
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .unwrap_or(profile.open_action.as_str());

    tracing::info!(
        device = %profile.name,
        action = %action,
        user = %actor.name,
        class = %actor.device_class,
        "Actuation requested"
    );
    publish(&relay, &profile.name, action, &actor);
    Ok(success())
}

pub(super) async fn firmware_update(
    State(relay): State<Arc<Relay>>,
    actor: Actor,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request: UpdateRequest = parse_body(&body)?;
    let profile = target_device(&relay, request.dispositivo.as_deref())?;

    tracing::warn!(device = %profile.name, user = %actor.name, "Firmware update requested");
    publish(&relay, &profile.name, &profile.update_action, &actor);
    Ok(success())
}

pub(super) async fn events(
    State(relay): State<Arc<Relay>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let primary = relay.primary_device().to_string();
    let subscription = relay.broadcaster().subscribe();
    tracing::debug!(subscriber = %subscription.id(), "Event stream opened");

    let stream = subscription.map(move |update| {
        let event = if update.device == primary {
            Event::default()
        } else {
            Event::default().event(update.device)
        };
        Ok(event.data(update.state))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
