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

//! The mail transaction accumulated by one SMTP session.

use crate::store::Message;

/// The sender, recipients, and body of the mail transaction in progress on one connection.
///
/// A transaction is open once a sender is set. Recipients and body lines may only be added to an
/// open transaction.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Transaction {
    /// Empty until `MAIL FROM` is accepted.
    sender: String,
    recipients: Vec<String>,
    body: String,
    /// The body went over the size limit and lines are being discarded.
    oversized: bool,
    /// Set by a successful `AUTH`. Survives [`Self::reset`], as it belongs to the connection.
    authenticated: bool,
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a sender has been set.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_empty()
    }

    /// The sender, if the transaction is open.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.is_open().then_some(self.sender.as_str())
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub const fn is_oversized(&self) -> bool {
        self.oversized
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Discard any transaction in progress and open a new one from `sender`.
    pub fn begin(&mut self, sender: String) {
        self.reset();
        self.sender = sender;
    }

    pub fn add_recipient(&mut self, recipient: String) {
        debug_assert!(self.is_open(), "recipient added to a closed transaction");

        self.recipients.push(recipient);
    }

    /// Append a line of mail data, followed by `\n`.
    pub fn append_line(&mut self, line: &str) {
        debug_assert!(self.is_open(), "body added to a closed transaction");

        if self.oversized {
            return;
        }

        self.body.push_str(line);
        self.body.push('\n');
    }

    /// Drop the body collected so far and ignore any further lines until the next reset.
    pub fn mark_oversized(&mut self) {
        self.oversized = true;
        self.body = String::new();
    }

    pub fn set_authenticated(&mut self) {
        self.authenticated = true;
    }

    /// Clear the sender, recipients, and body.
    pub fn reset(&mut self) {
        *self = Self {
            authenticated: self.authenticated,
            ..Self::default()
        };
    }

    /// Snapshot the transaction into a [`Message`] and reset it.
    ///
    /// Returns `None`, leaving the transaction untouched, if it has no sender or no recipients.
    pub fn finish(&mut self) -> Option<Message> {
        if !self.is_open() || self.recipients.is_empty() {
            return None;
        }

        let finished = std::mem::take(self);
        self.authenticated = finished.authenticated;

        Some(Message::new(
            finished.sender,
            finished.recipients,
            finished.body,
        ))
    }
}
