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

//! One SMTP session, driven a line at a time.
//!
//! A [`Session`] owns the [`State`] and [`Transaction`] of a single connection. It runs every line
//! through [`machine::transition`], then carries out the resulting [`Action`], calling out to the
//! [`crate::store::MessageStore`] and [`crate::auth::CredentialVerifier`] of its [`Inbox`] where
//! needed.

use std::net::SocketAddr;

use tracing::{debug, info, trace, warn};

use super::{
    machine::{self, Action, Input, Policy, State},
    reply::{Code, Reply},
    transaction::Transaction,
};
use crate::{auth::Credentials, store::StoreError, Inbox};

pub struct Session {
    state: State,
    transaction: Transaction,
    client: SocketAddr,
    /// The domain the client gave with `HELO` or `EHLO`.
    hello: Option<String>,
    policy: Policy,
    inbox: Inbox,
}

impl Session {
    #[must_use]
    pub fn new(inbox: Inbox, client: SocketAddr) -> Self {
        let policy = Policy::new(inbox.config(), inbox.credentials().is_some());

        Self {
            state: State::Greeting,
            transaction: Transaction::new(),
            client,
            hello: None,
            policy,
            inbox,
        }
    }

    /// Get the `220` greeting, moving on to waiting for `HELO`.
    ///
    /// Returns `None` if the greeting was already sent.
    pub fn greet(&mut self) -> Option<Reply> {
        if self.state != State::Greeting {
            return None;
        }

        let step = machine::greet(&self.policy);
        self.state = step.state;
        step.reply
    }

    /// Handle one line from the client, returning the reply to send, if any.
    ///
    /// Lines of mail data get no reply until the terminating `.`.
    pub async fn handle(&mut self, input: Input<'_>) -> Option<Reply> {
        let step = machine::transition(self.state, input, &self.transaction, &self.policy);

        if step.state != self.state {
            debug!(from = ?self.state, to = ?step.state, "state changed");
        }
        self.state = step.state;

        let resolved = match step.action {
            Action::None => None,
            Action::Hello(domain) => {
                debug!(client = %self.client, hello = %domain, "client introduced itself");
                self.transaction.reset();
                self.hello = Some(domain);
                None
            }
            Action::Reset => {
                self.transaction.reset();
                None
            }
            Action::Begin(sender) => {
                self.transaction.begin(sender);
                None
            }
            Action::AddRecipient(recipient) => {
                self.transaction.add_recipient(recipient);
                None
            }
            Action::AppendLine(line) => {
                trace!(bytes = line.len(), "body line");
                self.transaction.append_line(&line);
                None
            }
            Action::MarkOversized => {
                warn!(
                    client = %self.client,
                    max = self.policy.max_message_bytes,
                    "message too large, discarding the rest of its data"
                );
                self.transaction.mark_oversized();
                None
            }
            Action::Authenticate(credentials) => Some(self.authenticate(&credentials).await),
            Action::Finish => Some(self.finish().await),
        };

        resolved.or(step.reply)
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    #[must_use]
    pub const fn client(&self) -> SocketAddr {
        self.client
    }

    #[must_use]
    pub fn hello(&self) -> Option<&str> {
        self.hello.as_deref()
    }

    /// Check `credentials` against the [`crate::auth::CredentialVerifier`], replying `235` or
    /// `535`.
    async fn authenticate(&mut self, credentials: &Credentials) -> Reply {
        let verified = match self.inbox.credentials() {
            Some(verifier) => verifier.verify(credentials).await,
            None => false,
        };

        if verified {
            info!(client = %self.client, username = credentials.username(), "authenticated");
            self.transaction.set_authenticated();
            Reply::new(Code::AuthSucceeded, "Authentication succeeded")
        } else {
            warn!(
                client = %self.client,
                username = credentials.username(),
                "authentication failed"
            );
            Reply::new(Code::AuthInvalid, "Authentication credentials invalid")
        }
    }

    /// Hand the transaction to the [`crate::store::MessageStore`], replying `250` or `451`.
    ///
    /// The transaction is cleared whether or not storing succeeds.
    async fn finish(&mut self) -> Reply {
        let Some(message) = self.transaction.finish() else {
            self.transaction.reset();
            return Reply::new(Code::LocalError, "Requested action aborted: no transaction");
        };

        let sender = message.sender().to_string();
        let recipients = message.recipients().len();
        let timeout = self.inbox.config().write_timeout;

        let result = tokio::time::timeout(timeout, self.inbox.store().store(message))
            .await
            .unwrap_or_else(|_| Err(StoreError::TimedOut(timeout)));

        match result {
            Ok(id) => {
                info!(client = %self.client, %id, %sender, recipients, "message stored");
                Reply::new(Code::Ok, format!("OK: queued as {id}"))
            }
            Err(error) => {
                warn!(client = %self.client, %sender, %error, "failed to store message");
                Reply::new(
                    Code::LocalError,
                    "Requested action aborted: local error in processing",
                )
            }
        }
    }
}
