// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request authentication and actor identification.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::relay::Relay;

use super::ApiError;

/// Returns the session token carried by `Authorization`, with or without a
/// `Bearer ` prefix.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Derives the actor device class from a `User-Agent` header.
#[must_use]
pub fn device_class(user_agent: Option<&str>) -> &'static str {
    let user_agent = user_agent.unwrap_or_default();
    if user_agent.contains("Android") {
        "Android Web"
    } else if user_agent.contains("iPhone") {
        "iPhone Web"
    } else if user_agent.contains("Windows") {
        "PC Windows"
    } else {
        "Navegador Web"
    }
}

/// The authenticated caller of a privileged endpoint.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Display name bound to the session.
    pub name: String,
    /// Device class derived from the `User-Agent`.
    pub device_class: &'static str,
}

impl FromRequestParts<Arc<Relay>> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        relay: &Arc<Relay>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::InvalidSession)?;
        let name = relay.sessions().resolve_session(token).inspect_err(|_| {
            tracing::info!(path = %parts.uri.path(), "Rejected request with unknown session");
        })?;

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok());

        Ok(Self {
            name,
            device_class: device_class(user_agent),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn device_class_from_user_agent() {
        assert_eq!(
            device_class(Some("Mozilla/5.0 (Linux; Android 14; Pixel 8)")),
            "Android Web"
        );
        assert_eq!(
            device_class(Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)")),
            "iPhone Web"
        );
        assert_eq!(
            device_class(Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")),
            "PC Windows"
        );
        assert_eq!(
            device_class(Some("Mozilla/5.0 (X11; Linux x86_64)")),
            "Navegador Web"
        );
        assert_eq!(device_class(None), "Navegador Web");
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("  "));
        assert_eq!(bearer_token(&headers), None);
    }
}
