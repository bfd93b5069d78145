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

#![warn(clippy::nursery, clippy::pedantic)]
#![cfg_attr(debug_assertions, allow(clippy::missing_errors_doc))]

//! An inbound SMTP listener that accepts mail and hands every message to a [`MessageStore`].
//!
//! Build an [`Inbox`] from a [`Config`] and a store, then either [`serve`] it, or drive
//! connections yourself with [`listen`].

use std::{fmt::Debug, io, sync::Arc};

use async_stream::stream;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info, instrument};

use crate::{auth::CredentialVerifier, config::Config, connection::CloseReason, store::MessageStore};

pub mod auth;
pub mod config;
pub mod connection;
pub mod store;
pub mod str;
pub mod timeouts;

#[cfg(test)]
mod test;

/// Write `line` to `writer`, followed by `CRLF`.
///
/// Implicitly calls `.await`.
#[cfg(test)]
macro_rules! write_line {
    ($writer:expr, $line:expr) => {
        ::tokio::io::AsyncWriteExt::write_all(&mut $writer, concat!($line, "\r\n").as_bytes())
            .await
    };
}

/// Format a line like [`format!`] and write it to `writer`, followed by `CRLF`.
///
/// Implicitly calls `.await`.
macro_rules! write_fmt_line {
    ($writer:expr, $($arg:tt)*) => {
        ::tokio::io::AsyncWriteExt::write_all(
            &mut $writer,
            format!("{}\r\n", format_args!($($arg)*)).as_bytes(),
        )
        .await
    };
}

/// Read a line, line ending included, out of `reader`.
///
/// Returns a future, so it must be awaited.
#[cfg(test)]
macro_rules! read_line {
    ($reader:expr) => {
        async {
            let mut line = String::new();
            ::tokio::io::AsyncBufReadExt::read_line(&mut $reader, &mut line)
                .await
                .map(|_| line)
        }
    };
}

#[cfg(test)]
pub(crate) use {read_line, write_line};
pub(crate) use write_fmt_line;

/// Everything the sessions of one listener share.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Inbox {
    config: Arc<Config>,
    store: Arc<dyn MessageStore>,
    credentials: Option<Arc<dyn CredentialVerifier>>,
}

impl Inbox {
    /// Create an inbox without authentication. `AUTH` will be refused.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            credentials: None,
        }
    }

    /// Check `AUTH` credentials with `verifier`.
    #[must_use]
    pub fn with_credentials(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.credentials = Some(verifier);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn MessageStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&dyn CredentialVerifier> {
        self.credentials.as_deref()
    }
}

impl Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("config", &self.config)
            .field("credentials", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

/// Accept connections from `listener` forever, handling each as an SMTP session on its own task.
///
/// Yields the [`JoinHandle`] of every session as it is spawned, or the error from a failed
/// accept. A failed accept does not end the stream.
pub fn listen(
    listener: TcpListener,
    inbox: Inbox,
) -> impl Stream<Item = io::Result<JoinHandle<io::Result<CloseReason>>>> {
    stream! {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    yield Err(err);
                    continue;
                }
            };

            yield Ok(tokio::spawn(connection::handle(stream, peer, inbox.clone())));
        }
    }
}

/// Bind [`Config::listen_address`] and serve SMTP sessions until the process exits.
///
/// # Errors
///
/// Returns the error from binding the listener. Errors from accepting or handling single
/// connections are logged and do not stop the server.
#[instrument(skip_all, fields(address = %inbox.config().listen_address))]
pub async fn serve(inbox: Inbox) -> io::Result<()> {
    let listener = TcpListener::bind(&inbox.config().listen_address).await?;
    info!(local = %listener.local_addr()?, "listening");

    let sessions = listen(listener, inbox);
    pin_mut!(sessions);

    while let Some(session) = sessions.next().await {
        // Sessions log their own outcome.
        if let Err(err) = session {
            error!(%err, "failed to accept connection");
        }
    }

    Ok(())
}
