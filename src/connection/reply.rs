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

//! Replies sent from the server to an SMTP client.
//!
//! A reply is a three digit [`Code`] followed by one or more lines of text. Every line but the last
//! separates the code from the text with `-`, the last one with a space.
//!
//! [RFC 5321 section 4.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2).

use std::{borrow::Cow, fmt::Display};

use super::command::CommandError;
use crate::str::CRLF;

/// The reply codes this server sends.
///
/// [RFC 5321 section 4.2.3](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2.3), and
/// [RFC 4954 section 6](https://www.rfc-editor.org/rfc/rfc4954.html#section-6) for the
/// authentication codes.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Copy, Clone)]
#[repr(u16)]
pub enum Code {
    ServiceReady = 220,
    Closing = 221,
    AuthSucceeded = 235,
    Ok = 250,
    StartMailInput = 354,
    LocalError = 451,
    InsufficientStorage = 452,
    SyntaxError = 500,
    NotImplemented = 502,
    BadSequence = 503,
    ParameterNotImplemented = 504,
    AuthRequired = 530,
    AuthInvalid = 535,
    EncryptionRequired = 538,
    ExceededStorage = 552,
}

impl Code {
    /// Get the numeric value of the code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_u16().fmt(f)
    }
}

/// Indicates if a line of a reply is the last one.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
enum MultiLine {
    /// This is the last line of the reply.
    LastLine,
    /// This is not the last line of the reply, there will be more following it.
    HasNext,
}

impl MultiLine {
    /// Get the character used to split the code and text of a reply line.
    #[must_use]
    pub const fn split(self) -> char {
        match self {
            Self::LastLine => ' ',
            Self::HasNext => '-',
        }
    }
}

/// One reply from the server, possibly spanning multiple lines.
///
/// [`Display`] renders every line, separating them with [`CRLF`], but does not append a trailing
/// line ending. Write it with [`crate::write_fmt_line`].
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Reply {
    code: Code,
    lines: Vec<Cow<'static, str>>,
}

impl Reply {
    /// Create a single line reply.
    #[must_use]
    pub fn new(code: Code, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            lines: vec![text.into()],
        }
    }

    /// Create a reply from several lines of text.
    ///
    /// An empty list of lines is rendered as a single line without text.
    #[must_use]
    pub fn multiline(code: Code, lines: Vec<Cow<'static, str>>) -> Self {
        Self { code, lines }
    }

    /// The opening `220` reply sent as soon as a connection is accepted.
    #[must_use]
    pub fn greeting(domain: &str) -> Self {
        Self::new(Code::ServiceReady, format!("{domain} ESMTP ready"))
    }

    /// The `221` reply to `QUIT`.
    #[must_use]
    pub fn closing(domain: &str) -> Self {
        Self::new(Code::Closing, format!("{domain} closing connection"))
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(Code::Ok, "OK")
    }

    #[must_use]
    pub fn start_mail_input() -> Self {
        Self::new(Code::StartMailInput, "Start mail input; end with <CRLF>.<CRLF>")
    }

    /// Reply to a command line that could not be parsed.
    #[must_use]
    pub fn syntax_error(error: &CommandError) -> Self {
        Self::new(Code::SyntaxError, format!("Syntax error - {error}"))
    }

    /// Reply to a well formed command that is not allowed in the current state.
    #[must_use]
    pub fn invalid_sequence() -> Self {
        Self::new(Code::SyntaxError, "Invalid command sequence")
    }

    /// Reply to a command verb that this server does not know.
    ///
    /// [RFC 5321 section 4.2.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2.4).
    #[must_use]
    pub fn unrecognized() -> Self {
        Self::new(Code::SyntaxError, "Command not recognized")
    }

    #[must_use]
    pub fn bad_sequence(text: &'static str) -> Self {
        Self::new(Code::BadSequence, text)
    }

    /// Get the code of the reply.
    #[must_use]
    pub const fn code(&self) -> Code {
        self.code
    }

    /// Get the lines of text of the reply, without codes.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(AsRef::as_ref)
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some((last, rest)) = self.lines.split_last() else {
            return self.code.fmt(f);
        };

        for line in rest {
            write!(f, "{}{}{line}{CRLF}", self.code, MultiLine::HasNext.split())?;
        }

        write!(f, "{}{}{last}", self.code, MultiLine::LastLine.split())
    }
}
