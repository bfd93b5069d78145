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

//! Text helpers for reading and parsing SMTP lines.

pub(crate) mod max_lengths;

/// The line ending sequence required on every line sent by this server.
///
/// [RFC 5321 section 2.3.8](https://www.rfc-editor.org/rfc/rfc5321.html#section-2.3.8).
pub const CRLF: &str = "\r\n";

/// The line that ends the mail data of a `DATA` command.
///
/// [RFC 5321 section 4.1.1.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.4).
pub const DATA_TERMINATOR: &str = ".";

/// Strip the line ending from a raw line read off the wire.
///
/// Accepts `CRLF` and, for the sake of Postel's Law, a bare `LF`. A `CR` immediately before the
/// `LF` is removed along with it, but a lone `CR` elsewhere is kept as content.
///
/// Returns `None` if the line does not end with `LF`, which means it is a partial line.
#[must_use]
pub fn strip_line_ending(line: &[u8]) -> Option<&[u8]> {
    let line = line.strip_suffix(b"\n")?;

    Some(line.strip_suffix(b"\r").unwrap_or(line))
}

/// Undo the transparency procedure applied by the client to a line of mail data.
///
/// The client doubles any leading period so that content is never mistaken for
/// [`DATA_TERMINATOR`]. The receiver removes the first period of every line that starts with one.
///
/// Must not be called with the terminator line itself.
///
/// [RFC 5321 section 4.5.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.2).
#[must_use]
pub fn unstuff(line: &str) -> &str {
    line.strip_prefix('.').unwrap_or(line)
}

/// Compare the start of `str` against an ASCII `prefix` without regard to case, returning the
/// rest of `str` if it matches.
#[must_use]
pub fn strip_prefix_ignore_ascii_case<'a>(str: &'a str, prefix: &str) -> Option<&'a str> {
    let head = str.get(..prefix.len())?;

    head.eq_ignore_ascii_case(prefix).then(|| &str[prefix.len()..])
}
