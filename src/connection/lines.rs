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

//! Splits the byte stream of a connection into protocol lines.
//!
//! See [`lines`].

use std::{io, time::Duration};

use async_stream::stream;
use futures_core::Stream;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    time::error::Elapsed,
};

use super::machine::Input;
use crate::str::{max_lengths, strip_line_ending};

/// One line read from a client, without its line ending.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Line {
    /// A complete line. Bytes that are not valid UTF-8 are replaced with `U+FFFD`.
    Text(String),
    /// A line longer than [`max_lengths::TEXT_LINE`]. Its contents were discarded.
    Overlong,
}

impl Line {
    /// Borrow the line as input for the state machine.
    #[must_use]
    pub fn as_input(&self) -> Input<'_> {
        match self {
            Self::Text(text) => Input::Line(text),
            Self::Overlong => Input::Overlong,
        }
    }
}

/// Possible errors that end the stream of [`lines`].
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// No complete line arrived within the read timeout.
    #[error("timed out waiting for a line")]
    TimedOut(#[from] Elapsed),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Lazily read [`Line`]s out of `reader`.
///
/// Every line must arrive within `read_timeout`, otherwise the stream yields
/// [`ReadError::TimedOut`] and ends. It also ends after yielding any I/O error, or when `reader`
/// reaches end of file. Bytes after the last line ending are a partial line and are dropped.
pub fn lines<R>(
    mut reader: R,
    read_timeout: Duration,
) -> impl Stream<Item = Result<Line, ReadError>>
where
    R: AsyncBufRead + Unpin,
{
    stream! {
        let mut buffer = Vec::with_capacity(max_lengths::TEXT_LINE);

        loop {
            buffer.clear();

            let framing = match tokio::time::timeout(
                read_timeout,
                read_bounded_line(&mut reader, &mut buffer, max_lengths::TEXT_LINE),
            )
            .await
            {
                Ok(Ok(framing)) => framing,
                Ok(Err(err)) => {
                    yield Err(ReadError::Io(err));
                    break;
                }
                Err(elapsed) => {
                    yield Err(ReadError::TimedOut(elapsed));
                    break;
                }
            };

            match framing {
                Framing::Complete => {
                    let line = strip_line_ending(&buffer).unwrap_or(&buffer);

                    yield Ok(Line::Text(String::from_utf8_lossy(line).into_owned()));
                }
                Framing::Overlong => yield Ok(Line::Overlong),
                Framing::EndOfFile => break,
            }
        }
    }
}

/// How [`read_bounded_line`] stopped reading.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
enum Framing {
    /// `buffer` holds a line, including its line ending.
    Complete,
    /// A line ending was found after more than `limit` bytes; `buffer` is empty.
    Overlong,
    /// The reader ran out of bytes before a line ending.
    EndOfFile,
}

/// Read bytes up to and including the next `LF` into `buffer`, storing at most `limit` bytes.
///
/// Once a line grows past `limit`, the rest of it is still consumed from `reader`, but discarded.
async fn read_bounded_line<R>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    limit: usize,
) -> io::Result<Framing>
where
    R: AsyncBufRead + Unpin,
{
    let mut overlong = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(Framing::EndOfFile);
        }

        let (used, found_end) = match available.iter().position(|&byte| byte == b'\n') {
            Some(index) => (index + 1, true),
            None => (available.len(), false),
        };

        if !overlong {
            if buffer.len() + used > limit {
                overlong = true;
                buffer.clear();
            } else {
                buffer.extend_from_slice(&available[..used]);
            }
        }

        reader.consume(used);

        if found_end {
            return Ok(if overlong {
                Framing::Overlong
            } else {
                Framing::Complete
            });
        }
    }
}
