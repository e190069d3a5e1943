// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP surface.
//!
//! | Route | Auth | Purpose |
//! |---|---|---|
//! | `POST /api/login` | none | exchange the password for a session token |
//! | `POST /api/logout` | token | end the session |
//! | `POST /api/acionar` | token | publish an open (or custom) command |
//! | `POST /api/admin/update` | token | publish a firmware-update command |
//! | `GET /events` | none | Server-Sent Events stream of device state |
//!
//! The token is passed verbatim in the `Authorization` header. Anything else
//! is served from the static asset directory, when one is configured.

mod auth;
mod error;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use auth::{Actor, device_class};
pub use error::ApiError;

use crate::relay::Relay;

/// Builds the application router.
pub fn router(relay: Arc<Relay>) -> Router {
    let routes = Router::new()
        .route("/api/login", post(handlers::login))
        .route("/api/logout", post(handlers::logout))
        .route("/api/acionar", post(handlers::actuate))
        .route("/api/admin/update", post(handlers::firmware_update))
        .route("/events", get(handlers::events));

    let routes = match relay.static_dir() {
        Some(dir) => {
            tracing::debug!(dir = %dir.display(), "Serving static assets");
            routes.fallback_service(ServeDir::new(dir))
        }
        None => routes,
    };

    routes.layer(TraceLayer::new_for_http()).with_state(relay)
}
