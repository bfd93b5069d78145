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

//! Settings for an [`crate::Inbox`].

use std::{env, str::FromStr, time::Duration};

use crate::timeouts;

/// The port SMTP listeners bind to when nothing else is configured.
pub const DEFAULT_PORT: u16 = 2525;

/// Settings shared by every session of an [`crate::Inbox`].
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Config {
    /// The socket address to listen on, such as `0.0.0.0:2525`.
    pub listen_address: String,
    /// The domain this server announces in its greeting and replies.
    pub domain_name: String,
    /// How long to wait for the next line from a client before closing the connection.
    pub read_timeout: Duration,
    /// How long to wait for a reply to be written, or for a message to be stored.
    pub write_timeout: Duration,
    /// The largest accepted message body, in bytes.
    pub max_message_bytes: usize,
    /// The largest accepted number of recipients for one message.
    pub max_recipients: usize,
    /// Offer `AUTH` on connections that are not encrypted.
    ///
    /// This server never encrypts connections, so turning this off turns authentication off.
    pub allow_insecure_auth: bool,
    /// Refuse `MAIL FROM` until the client has authenticated.
    pub require_auth: bool,
}

impl Config {
    /// Build a [`Config`] from environment variables, falling back to [`Config::default`] for
    /// each variable that is not set.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `SMTP_LISTEN_ADDRESS` | [`Self::listen_address`] |
    /// | `SMTP_DOMAIN_NAME` | [`Self::domain_name`] |
    /// | `SMTP_READ_TIMEOUT_SECS` | [`Self::read_timeout`] |
    /// | `SMTP_WRITE_TIMEOUT_SECS` | [`Self::write_timeout`] |
    /// | `SMTP_MAX_MESSAGE_BYTES` | [`Self::max_message_bytes`] |
    /// | `SMTP_MAX_RECIPIENTS` | [`Self::max_recipients`] |
    /// | `SMTP_ALLOW_INSECURE_AUTH` | [`Self::allow_insecure_auth`] |
    /// | `SMTP_REQUIRE_AUTH` | [`Self::require_auth`] |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a [`Config`] from an arbitrary source of variables.
    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parse<T: FromStr>(
            lookup: &impl Fn(&'static str) -> Option<String>,
            name: &'static str,
        ) -> Result<Option<T>, ConfigError> {
            lookup(name)
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ConfigError::Invalid { name, value })
                })
                .transpose()
        }

        let defaults = Self::default();

        Ok(Self {
            listen_address: lookup("SMTP_LISTEN_ADDRESS").unwrap_or(defaults.listen_address),
            domain_name: lookup("SMTP_DOMAIN_NAME").unwrap_or(defaults.domain_name),
            read_timeout: parse(&lookup, "SMTP_READ_TIMEOUT_SECS")?
                .map_or(defaults.read_timeout, Duration::from_secs),
            write_timeout: parse(&lookup, "SMTP_WRITE_TIMEOUT_SECS")?
                .map_or(defaults.write_timeout, Duration::from_secs),
            max_message_bytes: parse(&lookup, "SMTP_MAX_MESSAGE_BYTES")?
                .unwrap_or(defaults.max_message_bytes),
            max_recipients: parse(&lookup, "SMTP_MAX_RECIPIENTS")?
                .unwrap_or(defaults.max_recipients),
            allow_insecure_auth: parse(&lookup, "SMTP_ALLOW_INSECURE_AUTH")?
                .unwrap_or(defaults.allow_insecure_auth),
            require_auth: parse(&lookup, "SMTP_REQUIRE_AUTH")?.unwrap_or(defaults.require_auth),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            domain_name: "localhost".to_string(),
            read_timeout: timeouts::SERVER_TIMEOUT,
            write_timeout: timeouts::DATA_BLOCK,
            max_message_bytes: 1024 * 1024,
            max_recipients: 50,
            allow_insecure_auth: true,
            require_auth: false,
        }
    }
}

/// Possible errors encountered when building a [`Config`] from the environment.
#[derive(thiserror::Error, PartialEq, Eq, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}
