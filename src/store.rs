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

//! The boundary between an SMTP session and durable storage.
//!
//! A session hands every completed transaction to a [`MessageStore`] as an immutable [`Message`].
//! The store is shared by every session, so implementations must be safe to call concurrently.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, SystemTime},
};

use async_trait::async_trait;

/// A snapshot of one completed mail transaction.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Message {
    sender: String,
    recipients: Vec<String>,
    subject: Option<String>,
    body: String,
    received_at: SystemTime,
}

impl Message {
    /// Create a message, extracting its subject from the header section of `body`.
    #[must_use]
    pub fn new(sender: String, recipients: Vec<String>, body: String) -> Self {
        let subject = extract_subject(&body);

        Self {
            sender,
            recipients,
            subject,
            body,
            received_at: SystemTime::now(),
        }
    }

    /// The reverse-path given with `MAIL FROM`.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Every forward-path given with `RCPT TO`, in the order they were received.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// The first recipient of the message.
    #[must_use]
    pub fn primary_recipient(&self) -> Option<&str> {
        self.recipients.first().map(String::as_str)
    }

    /// The value of the `Subject` header, if the message has one.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// The mail data, headers included, with one `\n` after every line.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub const fn received_at(&self) -> SystemTime {
        self.received_at
    }
}

/// Find the `Subject` header in the header section of `data`.
///
/// The header section ends at the first empty line. Header names are matched without regard to
/// case, and folded continuation lines (starting with whitespace) are unfolded into the value.
///
/// [RFC 5322 section 2.2](https://www.rfc-editor.org/rfc/rfc5322.html#section-2.2).
fn extract_subject(data: &str) -> Option<String> {
    let mut lines = data.lines().take_while(|line| !line.is_empty()).peekable();

    while let Some(line) = lines.next() {
        let Some(value) = crate::str::strip_prefix_ignore_ascii_case(line, "Subject:") else {
            continue;
        };

        let mut subject = value.trim().to_string();
        while let Some(folded) = lines.next_if(|line| line.starts_with([' ', '\t'])) {
            subject.push(' ');
            subject.push_str(folded.trim());
        }

        return Some(subject);
    }

    None
}

/// The identifier a [`MessageStore`] assigned to a stored [`Message`].
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Copy, Clone)]
pub struct MessageId(pub u64);

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Possible errors encountered when storing a [`Message`].
#[derive(thiserror::Error, PartialEq, Eq, Debug, Clone)]
pub enum StoreError {
    /// The store cannot currently accept messages.
    #[error("message store unavailable: {0}")]
    Unavailable(String),
    /// The store refused this particular message, such as for a constraint violation.
    #[error("message rejected by store: {0}")]
    Rejected(String),
    /// The store did not answer in time.
    #[error("message store did not respond within {0:?}")]
    TimedOut(Duration),
}

/// Durably stores completed messages.
///
/// Sessions never retry a failed call; the failure is reported to the client, which may retry
/// the whole transaction.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Store `message`, returning the identifier it was stored under.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the message could not be stored.
    async fn store(&self, message: Message) -> Result<MessageId, StoreError>;
}

/// A [`MessageStore`] keeping messages in memory.
///
/// Without a limit, every message is kept until the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    messages: Mutex<Vec<(MessageId, Message)>>,
    limit: Option<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses new messages once it holds `limit` of them.
    ///
    /// A refused message is reported as [`StoreError::Unavailable`], so clients may retry later.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Get a copy of every stored message, in the order they were stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a previous caller panicked while holding the lock.
    pub fn messages(&self) -> Result<Vec<(MessageId, Message)>, StoreError> {
        let messages = self.messages.lock().map_err(|_| poisoned())?;

        Ok(messages.clone())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn store(&self, message: Message) -> Result<MessageId, StoreError> {
        let mut messages = self.messages.lock().map_err(|_| poisoned())?;
        if self.limit.is_some_and(|limit| messages.len() >= limit) {
            return Err(StoreError::Unavailable("message store full".to_string()));
        }

        let id = MessageId(self.next_id.fetch_add(1, Ordering::Relaxed));

        messages.push((id, message));
        Ok(id)
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("message list lock poisoned".to_string())
}
