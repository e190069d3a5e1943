// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::AuthError;

/// Failure of an API request, rendered as `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Wrong password or missing session.
    Auth(AuthError),
    /// The request named a device that is not configured.
    UnknownDevice(String),
    /// The request body is not valid JSON for the endpoint.
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::InvalidPassword) => StatusCode::UNAUTHORIZED,
            Self::Auth(AuthError::InvalidSession) => StatusCode::FORBIDDEN,
            Self::UnknownDevice(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Auth(AuthError::InvalidPassword) => "Senha Incorreta".to_string(),
            Self::Auth(AuthError::InvalidSession) => "Sessão Expirada.".to_string(),
            Self::UnknownDevice(device) => format!("Dispositivo desconhecido: {device}"),
            Self::BadRequest(reason) => format!("Requisição inválida: {reason}"),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(json!({ "success": false, "error": self.message() })),
        )
            .into_response()
    }
}
