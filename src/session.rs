// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory bearer-token sessions.
//!
//! Sessions are created by a successful password check and live until an
//! explicit logout or process exit. There is no expiry.

use std::collections::HashMap;
use std::fmt::{self, Write as _};

use parking_lot::RwLock;
use rand::RngCore;

use crate::error::AuthError;

/// Display name used when a login does not provide one.
pub const DEFAULT_DISPLAY_NAME: &str = "WebUser";

/// Opaque session token (128 random bits, hex-encoded).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(32);
        for byte in bytes {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Returns the token as sent to clients.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log a full bearer credential
        let short = self.0.get(..6).unwrap_or_default();
        write!(f, "SessionToken({short}...)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps session tokens to authenticated display names.
///
/// # Examples
///
/// ```
/// use gate_relay::session::SessionStore;
///
/// let store = SessionStore::new("s3cret");
/// let token = store.create_session("s3cret", Some("Ana")).unwrap();
/// assert_eq!(store.resolve_session(token.as_str()).unwrap(), "Ana");
///
/// store.destroy_session(token.as_str());
/// assert!(store.resolve_session(token.as_str()).is_err());
/// ```
pub struct SessionStore {
    secret: String,
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionStore {
    /// Creates an empty store guarded by `secret`.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a new session if `password` matches the configured secret.
    ///
    /// A missing or blank display name falls back to [`DEFAULT_DISPLAY_NAME`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPassword`] on a mismatch.
    pub fn create_session(
        &self,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SessionToken, AuthError> {
        if password != self.secret {
            tracing::info!("Rejected login with wrong password");
            return Err(AuthError::InvalidPassword);
        }

        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_string();

        let token = SessionToken::generate();
        tracing::info!(user = %display_name, token = ?token, "Session created");
        self.sessions
            .write()
            .insert(token.as_str().to_string(), display_name);
        Ok(token)
    }

    /// Returns the display name bound to `token`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSession`] if the token is unknown.
    pub fn resolve_session(&self, token: &str) -> Result<String, AuthError> {
        self.sessions
            .read()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidSession)
    }

    /// Ends a session. Returns `true` if the token was live.
    pub fn destroy_session(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token).is_some();
        if removed {
            tracing::info!("Session destroyed");
        }
        removed
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_32_hex_chars() {
        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(SessionToken::generate(), SessionToken::generate());
    }

    #[test]
    fn debug_does_not_leak_token() {
        let token = SessionToken::generate();
        let debug = format!("{token:?}");
        assert!(!debug.contains(token.as_str()));
    }

    #[test]
    fn wrong_password_is_rejected() {
        let store = SessionStore::new("s3cret");
        assert_eq!(
            store.create_session("guess", Some("Ana")),
            Err(AuthError::InvalidPassword)
        );
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn missing_name_uses_placeholder() {
        let store = SessionStore::new("s3cret");
        let token = store.create_session("s3cret", None).unwrap();
        assert_eq!(
            store.resolve_session(token.as_str()).unwrap(),
            DEFAULT_DISPLAY_NAME
        );

        let token = store.create_session("s3cret", Some("   ")).unwrap();
        assert_eq!(
            store.resolve_session(token.as_str()).unwrap(),
            DEFAULT_DISPLAY_NAME
        );
    }

    #[test]
    fn same_user_may_hold_several_sessions() {
        let store = SessionStore::new("s3cret");
        let first = store.create_session("s3cret", Some("Ana")).unwrap();
        let second = store.create_session("s3cret", Some("Ana")).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.session_count(), 2);

        store.destroy_session(first.as_str());
        assert!(store.resolve_session(first.as_str()).is_err());
        assert_eq!(store.resolve_session(second.as_str()).unwrap(), "Ana");
    }

    #[test]
    fn destroy_is_idempotent() {
        let store = SessionStore::new("s3cret");
        let token = store.create_session("s3cret", Some("Ana")).unwrap();
        assert!(store.destroy_session(token.as_str()));
        assert!(!store.destroy_session(token.as_str()));
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = SessionStore::new("s3cret");
        assert_eq!(
            store.resolve_session("deadbeef"),
            Err(AuthError::InvalidSession)
        );
    }
}
