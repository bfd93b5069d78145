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

//! Handles connections as SMTP sessions.
//!
//! See [`handle`].

pub mod command;
pub mod lines;
pub mod machine;
pub mod reply;
pub mod session;
pub mod transaction;

use std::{io, net::SocketAddr};

use futures_util::{pin_mut, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    time::error::Elapsed,
};
use tracing::{debug, error, info, instrument};

use self::{lines::ReadError, machine::State, session::Session};
use crate::{write_fmt_line, Inbox};


/// Handle a connection as an SMTP session until the client quits or the connection ends.
///
/// Sends the greeting, then reads lines from `stream` and writes a reply to each, in order. Every
/// read is bounded by [`crate::config::Config::read_timeout`] and every write by
/// [`crate::config::Config::write_timeout`]. A timeout closes the connection without a reply.
///
/// The write half of `stream` is shut down before returning.
///
/// # Errors
///
/// Returns any [`std::io::Error`] from reading or writing `stream`, except for those that mean the
/// client hung up, which end the session with [`CloseReason::ClosedByClient`] instead.
#[instrument(name = "connection", skip_all, fields(%peer))]
pub async fn handle<S>(stream: S, peer: SocketAddr, inbox: Inbox) -> io::Result<CloseReason>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Write `reply` with a trailing `CRLF`, or break `label` with the reason the connection
    /// ended.
    ///
    /// Implicitly calls `.await`.
    ///
    /// # Breaks
    ///
    /// If writing takes longer than `timeout`, break with [`CloseReason::TimedOut`].
    /// If the client hung up, break with [`CloseReason::ClosedByClient`].
    /// Any other I/O error breaks with `Err`.
    macro_rules! send_or_break {
        ($label:lifetime, $writer:expr, $timeout:expr, $reply:expr) => {
            match ::tokio::time::timeout($timeout, async {
                write_fmt_line!($writer, "{}", $reply)?;
                $writer.flush().await
            })
            .await
            {
                Ok(Ok(())) => (),
                Ok(Err(err)) if is_hang_up(&err) => break $label Ok(CloseReason::ClosedByClient),
                Ok(Err(err)) => break $label Err(err),
                Err(elapsed) => break $label Ok(CloseReason::TimedOut(elapsed)),
            }
        };
    }

    info!("connection opened");

    let read_timeout = inbox.config().read_timeout;
    let write_timeout = inbox.config().write_timeout;

    let (reader, mut writer) = tokio::io::split(stream);
    let lines = lines::lines(BufReader::new(reader), read_timeout);
    pin_mut!(lines);

    let mut session = Session::new(inbox, peer);

    let result = 'session: {
        if let Some(greeting) = session.greet() {
            debug!(code = greeting.code().as_u16(), "greeting");
            send_or_break!('session, writer, write_timeout, greeting);
        }

        loop {
            let line = match lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(ReadError::TimedOut(elapsed))) => {
                    break 'session Ok(CloseReason::TimedOut(elapsed));
                }
                Some(Err(ReadError::Io(err))) if is_hang_up(&err) => {
                    break 'session Ok(CloseReason::ClosedByClient);
                }
                Some(Err(ReadError::Io(err))) => break 'session Err(err),
                None => break 'session Ok(CloseReason::ClosedByClient),
            };

            if let Some(reply) = session.handle(line.as_input()).await {
                debug!(code = reply.code().as_u16(), "replying");
                send_or_break!('session, writer, write_timeout, reply);
            }

            if session.state() == State::Closed {
                break 'session Ok(CloseReason::Quit);
            }
        }
    };

    // The client may already be gone, in which case there is nothing left to flush.
    if let Err(err) = writer.shutdown().await {
        debug!(%err, "failed to shut down connection");
    }

    match &result {
        Ok(reason) => info!(?reason, "connection closed"),
        Err(err) => error!(%err, "connection failed"),
    }

    result
}

/// Whether `err` means the client closed the connection.
fn is_hang_up(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

/// Indicates why a connection was closed.
#[derive(PartialEq, Eq, Debug)]
pub enum CloseReason {
    /// The SMTP client requested to quit the session.
    Quit,
    /// More time [`Elapsed`] than the configured read or write timeout.
    TimedOut(Elapsed),
    /// The connection was ended by the client without `QUIT`.
    ClosedByClient,
}
