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

//! Parses a command line from an SMTP client into a [`Request`].
//!
//! See [`parse`].

use std::{fmt::Debug, ops::Range};

use ascii::{AsciiStr, AsciiString, IntoAsciiString};

use crate::{
    auth::{Credentials, PlainError},
    str::{max_lengths, strip_prefix_ignore_ascii_case},
};


/// A command from the client, with its arguments parsed.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Request {
    /// `HELO` (or `EHLO`, when `extended`) with the client's claimed domain.
    Hello { extended: bool, domain: String },
    /// `MAIL FROM:<sender>`.
    Mail { sender: String },
    /// `RCPT TO:<recipient>`.
    Recipient { recipient: String },
    Data,
    Reset,
    Noop,
    Quit,
    /// `AUTH <mechanism> [initial-response]`.
    Auth(Mechanism),
    /// A verb this server does not know, in uppercase.
    Unrecognized(String),
}

/// The mechanism requested with `AUTH`.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Mechanism {
    /// `PLAIN` with a decoded initial response.
    Plain(Credentials),
    /// Any other mechanism, in uppercase.
    Unsupported(String),
}

/// Parse a line from the client, without its line ending, as a [`Request`].
///
/// Only the verb is case-insensitive. Arguments are kept as sent, because the local part of a
/// mailbox is case-sensitive.
///
/// [RFC 5321 section 2.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-2.4).
///
/// # Errors
///
/// Returns [`CommandError`] describing why the line could not be parsed.
pub fn parse(line: &str) -> Result<Request, CommandError> {
    // The limit includes the line ending that was already stripped.
    if line.len() + 2 > max_lengths::COMMAND_LINE {
        return Err(CommandError::LineTooLong {
            max: max_lengths::COMMAND_LINE,
        });
    }

    // RFC 5321 uses US-ASCII, specifically ANSI X3.4-1968 (reference 6).
    //
    // https://www.rfc-editor.org/rfc/rfc5321.html#ref-6
    let line = line
        .into_ascii_string()
        .map_err(|_| CommandError::NonAscii)?;

    Request::try_from(&Command::new(line)?)
}

impl TryFrom<&Command> for Request {
    type Error = CommandError;

    fn try_from(command: &Command) -> Result<Self, Self::Error> {
        let text = command.text().map(AsciiStr::as_str);

        let request = match command.verb().as_str() {
            verb @ ("HELO" | "EHLO") => {
                let extended = verb == "EHLO";
                let domain = text.ok_or(CommandError::MissingArgument(if extended {
                    "EHLO"
                } else {
                    "HELO"
                }))?;
                if domain.len() > max_lengths::DOMAIN {
                    return Err(CommandError::DomainTooLong {
                        max: max_lengths::DOMAIN,
                    });
                }

                Self::Hello {
                    extended,
                    domain: domain.to_string(),
                }
            }
            "MAIL" => Self::Mail {
                sender: parse_path(text, "FROM:")?,
            },
            "RCPT" => Self::Recipient {
                recipient: parse_path(text, "TO:")?,
            },
            "DATA" => without_argument(text, "DATA", Self::Data)?,
            "RSET" => without_argument(text, "RSET", Self::Reset)?,
            "QUIT" => without_argument(text, "QUIT", Self::Quit)?,
            // `NOOP` may carry a string, which is ignored.
            "NOOP" => Self::Noop,
            "AUTH" => Self::Auth(parse_auth(text)?),
            verb => Self::Unrecognized(verb.to_string()),
        };

        Ok(request)
    }
}

/// Return `request` if the command had no text after its verb.
fn without_argument(
    text: Option<&str>,
    verb: &'static str,
    request: Request,
) -> Result<Request, CommandError> {
    match text {
        Some(_) => Err(CommandError::UnexpectedArgument(verb)),
        None => Ok(request),
    }
}

/// Parse the argument of `MAIL` or `RCPT`, such as `FROM:<smith@example.com>`.
///
/// Whitespace is tolerated after the `:`. Anything after the closing `>` must be separated by
/// whitespace and is ignored, as this server implements no service extensions.
///
/// [RFC 5321 section 4.1.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.2).
fn parse_path(text: Option<&str>, keyword: &'static str) -> Result<String, CommandError> {
    let text = text.ok_or(CommandError::MissingArgument(keyword))?;
    let rest = strip_prefix_ignore_ascii_case(text, keyword)
        .ok_or(CommandError::MissingArgument(keyword))?
        .trim_start();

    let path = rest
        .strip_prefix('<')
        .and_then(|rest| rest.split_once('>'))
        .filter(|(_, parameters)| {
            parameters.is_empty() || parameters.starts_with(|c: char| c.is_ascii_whitespace())
        })
        .map(|(path, _)| path)
        .ok_or(CommandError::MalformedPath)?;

    if path.is_empty() {
        return Err(CommandError::EmptyPath);
    }
    if path.len() + 2 > max_lengths::PATH {
        return Err(CommandError::PathTooLong {
            max: max_lengths::PATH,
        });
    }
    if path.contains(|c: char| c.is_ascii_whitespace() || c == '<') {
        return Err(CommandError::MalformedPath);
    }

    Ok(path.to_string())
}

/// Parse the argument of `AUTH`, such as `PLAIN AHRlc3R1c2VyAHRlc3RwYXNz`.
///
/// [RFC 4954 section 4](https://www.rfc-editor.org/rfc/rfc4954.html#section-4).
fn parse_auth(text: Option<&str>) -> Result<Mechanism, CommandError> {
    let text = text.ok_or(CommandError::MissingArgument("AUTH"))?;
    let (mechanism, response) = match text.split_once(' ') {
        Some((mechanism, response)) => (mechanism, Some(response.trim())),
        None => (text, None),
    };

    if !mechanism.eq_ignore_ascii_case("PLAIN") {
        return Ok(Mechanism::Unsupported(mechanism.to_ascii_uppercase()));
    }

    match response {
        None | Some("" | "=") => Err(CommandError::MissingAuthResponse),
        Some(response) => Ok(Mechanism::Plain(Credentials::from_plain(response)?)),
    }
}

/// One line of an SMTP command.
#[derive(PartialEq, Eq, Clone)]
struct Command {
    /// The entire line, unmodified except for the [`Self::verb`] range being set to uppercase.
    line: AsciiString,
    /// The range over [`Self::line`] without leading and trailing whitespace.
    trimmed: Range<usize>,
    /// The range over [`Self::line`] containing the verb of the command.
    verb: Range<usize>,
    /// The range over [`Self::line`] containing the text of the command.
    text: Option<Range<usize>>,
}

impl Command {
    /// Split a line into a verb and text.
    fn new(mut line: AsciiString) -> Result<Self, CommandError> {
        /// Trim the line of leading and trailing whitespace.
        ///
        /// RFC 5321 section 4.1.1 recommends to allow for trailing whitespace.
        /// This trims leading whitespace as well, for the sake of Postel's Law.
        ///
        /// Returns `None` if the string is empty or only whitespace.
        ///
        /// <https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1>
        fn trim(str: &AsciiStr) -> Option<Range<usize>> {
            // The index of the first byte that isn't whitespace.
            let leading_whitespace_len = str
                .as_str()
                .find(|c: char| !c.is_ascii_whitespace())
                .unwrap_or(str.len());
            // The index after the last byte that isn't whitespace.
            let trailing_whitespace_len = str.trim_end().len();

            let range = leading_whitespace_len..trailing_whitespace_len;

            // If `end < start` or `start == end`.
            if range.is_empty() {
                None
            } else {
                Some(range)
            }
        }

        /// Extract the command per RFC 5321 section 2.4.
        ///
        /// <https://www.rfc-editor.org/rfc/rfc5321.html#section-2.4>
        fn split_command(command: &AsciiStr) -> (Range<usize>, Option<Range<usize>>) {
            match command.as_str().split_once(' ') {
                Some((verb, text)) => {
                    // Skip any extra spaces between the verb and the text.
                    let text_start = command.len() - text.trim_start().len();

                    (
                        0..verb.len(),
                        Some(text_start..command.len()).filter(|range| !range.is_empty()),
                    )
                }
                None => (0..command.len(), None),
            }
        }

        if line.is_empty() {
            return Err(CommandError::Empty);
        }

        let trimmed = trim(&line).ok_or(CommandError::OnlyWhitespace)?;
        let (verb, text) = split_command(&line[trimmed.clone()]);

        // These ranges were obtained using the trimmed string instead of the actual line. This
        // recalibrates the ranges to point to their locations on the actual line instead of on the
        // trimmed string.
        let adjust_for_trim = |mut range: Range<usize>| {
            range.start += trimmed.start;
            range.end += trimmed.start;

            range
        };
        let verb = adjust_for_trim(verb);
        let text = text.map(adjust_for_trim);

        // Make the command verb uppercase for standardized comparison. Nothing else is touched.
        let verb_str: &mut AsciiStr = line[verb.clone()].as_mut();
        verb_str.make_ascii_uppercase();

        Ok(Self {
            line,
            trimmed,
            verb,
            text,
        })
    }

    /// Get the line with leading and trailing whitespace stripped as a string slice.
    fn trimmed(&self) -> &AsciiStr {
        self.get(&self.trimmed)
    }

    /// Get the verb of the command as an uppercase string slice.
    fn verb(&self) -> &AsciiStr {
        self.get(&self.verb)
    }

    /// Get the text of the command as a string slice.
    fn text(&self) -> Option<&AsciiStr> {
        let range = self.text.as_ref()?;

        Some(self.get(range))
    }

    /// Get a range of the internal [`AsciiString`] as a string slice.
    fn get(&self, range: &Range<usize>) -> &AsciiStr {
        &self.line[range.clone()]
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("line", &self.line)
            .field("trimmed()", &self.trimmed())
            .field("verb()", &self.verb())
            .field("text()", &self.text())
            .finish()
    }
}

/// Possible errors encountered when parsing a line into a [`Request`].
///
/// The [`Display`](std::fmt::Display) text is sent to the client after `500 Syntax error - `.
#[derive(thiserror::Error, PartialEq, Eq, Debug, Clone)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("command consists only of whitespace")]
    OnlyWhitespace,
    #[error("line too long (max {max} bytes)")]
    LineTooLong { max: usize },
    #[error("invalid character")]
    NonAscii,
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
    #[error("{0} takes no arguments")]
    UnexpectedArgument(&'static str),
    #[error("address must be enclosed in angle brackets")]
    MalformedPath,
    #[error("address cannot be empty")]
    EmptyPath,
    #[error("address too long (max {max} bytes)")]
    PathTooLong { max: usize },
    #[error("domain too long (max {max} bytes)")]
    DomainTooLong { max: usize },
    #[error("AUTH PLAIN requires an initial response")]
    MissingAuthResponse,
    #[error(transparent)]
    InvalidAuthResponse(#[from] PlainError),
}
