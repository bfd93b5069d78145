// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright © 2024 RemasteredArch
//
// This file is part of smtp_inbox.
//
// smtp_inbox is free software: you can redistribute it and/or modify it under the terms of the
// GNU Affero General Public License as published by the Free Software Foundation, either version
// 3 of the License, or (at your option) any later version.
//
// smtp_inbox is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
// the GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License along with
// smtp_inbox. If not, see <https://www.gnu.org/licenses/>.

//! Verifies credentials presented by clients with the `AUTH` command.
//!
//! Only the `PLAIN` mechanism is understood. How credentials are stored and compared is up to the
//! [`CredentialVerifier`] handed to [`crate::Inbox::with_credentials`].
//!
//! [RFC 4954](https://www.rfc-editor.org/rfc/rfc4954.html),
//! [RFC 4616](https://www.rfc-editor.org/rfc/rfc4616.html).

use std::fmt::Debug;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};

/// A username and password pair presented by a client.
#[derive(PartialEq, Eq, Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Decode the base64 response of the `PLAIN` mechanism.
    ///
    /// The decoded response is `authzid NUL authcid NUL passwd`. The authorization identity is
    /// ignored, as this server does not act on behalf of other users.
    ///
    /// # Errors
    ///
    /// Returns [`PlainError`] if the response is not base64, not UTF-8, does not have exactly
    /// three fields, or has an empty username.
    pub fn from_plain(response: &str) -> Result<Self, PlainError> {
        let decoded = STANDARD.decode(response.trim())?;
        let decoded = String::from_utf8(decoded).map_err(|_| PlainError::NotUtf8)?;

        let mut fields = decoded.split('\0');
        let (Some(_authzid), Some(username), Some(password), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(PlainError::FieldCount);
        };

        if username.is_empty() {
            return Err(PlainError::EmptyUsername);
        }

        Ok(Self::new(username, password))
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Possible errors encountered when decoding a `PLAIN` response into [`Credentials`].
#[derive(thiserror::Error, PartialEq, Eq, Debug, Clone)]
pub enum PlainError {
    #[error("invalid base64 in authentication response")]
    Base64(#[from] base64::DecodeError),
    #[error("authentication response is not UTF-8")]
    NotUtf8,
    #[error("authentication response must have three NUL separated fields")]
    FieldCount,
    #[error("authentication response has an empty username")]
    EmptyUsername,
}

/// Checks [`Credentials`] presented by a client.
///
/// Called once per `AUTH` attempt, possibly from many sessions at once.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns `true` if the credentials are accepted.
    async fn verify(&self, credentials: &Credentials) -> bool;
}

/// A [`CredentialVerifier`] accepting exactly one username and password pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    accepted: Credentials,
}

impl StaticCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            accepted: Credentials::new(username, password),
        }
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, credentials: &Credentials) -> bool {
        *credentials == self.accepted
    }
}
