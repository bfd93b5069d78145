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

//! Runs an SMTP listener configured from the environment, keeping received messages in memory.
//!
//! See [`smtp_inbox::config::Config::from_env`] for the recognized variables. Setting both
//! `SMTP_AUTH_USERNAME` and `SMTP_AUTH_PASSWORD` enables `AUTH PLAIN` with that single account.
//! Log output is filtered with `RUST_LOG`, defaulting to `info`.
//!
//! Messages are never evicted. Once `SMTP_STORED_MESSAGE_LIMIT` of them are held (default
//! [`DEFAULT_STORED_MESSAGE_LIMIT`]), further transactions are refused with `451` until restart.

use std::{env, error::Error, sync::Arc};

use smtp_inbox::{auth::StaticCredentials, config::Config, store::MemoryStore, Inbox};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How many messages to keep in memory when `SMTP_STORED_MESSAGE_LIMIT` is not set.
const DEFAULT_STORED_MESSAGE_LIMIT: usize = 10_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(domain = %config.domain_name, "starting");

    let limit = env::var("SMTP_STORED_MESSAGE_LIMIT")
        .ok()
        .map(|limit| limit.trim().parse::<usize>())
        .transpose()?
        .unwrap_or(DEFAULT_STORED_MESSAGE_LIMIT);

    let mut inbox = Inbox::new(config, Arc::new(MemoryStore::with_limit(limit)));

    if let (Ok(username), Ok(password)) = (
        env::var("SMTP_AUTH_USERNAME"),
        env::var("SMTP_AUTH_PASSWORD"),
    ) {
        info!(%username, "authentication enabled");
        inbox = inbox.with_credentials(Arc::new(StaticCredentials::new(username, password)));
    }

    smtp_inbox::serve(inbox).await?;

    Ok(())
}
