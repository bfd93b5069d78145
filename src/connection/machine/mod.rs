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

//! The SMTP protocol state machine.
//!
//! [`transition`] decides, for one line of input, the next [`State`], the [`Reply`] to send, and
//! the [`Action`] to apply to the [`Transaction`]. It performs no I/O and mutates nothing, so a
//! whole session can be checked without a socket. Applying the action is up to the caller, see
//! [`super::session::Session`].
//!
//! [RFC 5321 section 4.3](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.3).

use std::borrow::Cow;

use super::{
    command::{self, CommandError, Mechanism, Request},
    reply::{Code, Reply},
    transaction::Transaction,
};
use crate::{
    auth::Credentials,
    config::Config,
    str::{max_lengths, unstuff, DATA_TERMINATOR},
};

#[cfg(test)]
mod test;

/// Where a session is in the protocol.
#[derive(PartialEq, Eq, Debug, Hash, Copy, Clone)]
pub enum State {
    /// The connection was just accepted and the `220` greeting is yet to be sent.
    Greeting,
    /// Waiting for `HELO` or `EHLO`.
    AwaitHello,
    /// Waiting for `MAIL FROM` to open a transaction.
    AwaitMailFrom,
    /// Collecting `RCPT TO` until `DATA`.
    AwaitRcptTo,
    /// Collecting lines of mail data until the terminator.
    InData,
    /// The client quit. Nothing more is read.
    Closed,
}

/// One line of input for [`transition`].
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Input<'a> {
    /// A line without its line ending.
    Line(&'a str),
    /// A line too long to be buffered, whose contents were discarded.
    Overlong,
}

/// A change to apply to the session after a [`transition`].
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Action {
    None,
    /// Record the domain the client claimed and clear any transaction.
    Hello(String),
    /// Clear the transaction.
    Reset,
    /// Open a new transaction from this sender.
    Begin(String),
    AddRecipient(String),
    /// Append an already unstuffed line to the body.
    AppendLine(String),
    /// The body went over the size limit.
    MarkOversized,
    /// Check these credentials. The reply depends on the outcome.
    Authenticate(Credentials),
    /// Hand the transaction to the message store. The reply depends on the outcome.
    Finish,
}

/// The outcome of one [`transition`].
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Step {
    /// The state to move to.
    pub state: State,
    /// The reply to send. `None` for lines of mail data, and for actions that decide the reply
    /// themselves ([`Action::Authenticate`] and [`Action::Finish`]).
    pub reply: Option<Reply>,
    pub action: Action,
}

impl Step {
    const fn new(state: State, reply: Reply, action: Action) -> Self {
        Self {
            state,
            reply: Some(reply),
            action,
        }
    }

    /// Send `reply` and change nothing else.
    const fn respond(state: State, reply: Reply) -> Self {
        Self::new(state, reply, Action::None)
    }

    const fn silent(state: State, action: Action) -> Self {
        Self {
            state,
            reply: None,
            action,
        }
    }
}

/// Whether `AUTH` can be used.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum AuthSupport {
    /// No credential verifier is configured.
    Unavailable,
    /// A verifier is configured, but insecure authentication is not allowed and this server
    /// never encrypts connections.
    EncryptionRequired,
    Available,
}

/// The settings [`transition`] depends on.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Policy {
    pub domain_name: String,
    pub max_recipients: usize,
    pub max_message_bytes: usize,
    pub require_auth: bool,
    pub auth: AuthSupport,
}

impl Policy {
    #[must_use]
    pub fn new(config: &Config, has_verifier: bool) -> Self {
        let auth = match (has_verifier, config.allow_insecure_auth) {
            (false, _) => AuthSupport::Unavailable,
            (true, false) => AuthSupport::EncryptionRequired,
            (true, true) => AuthSupport::Available,
        };

        Self {
            domain_name: config.domain_name.clone(),
            max_recipients: config.max_recipients,
            max_message_bytes: config.max_message_bytes,
            require_auth: config.require_auth,
            auth,
        }
    }
}

/// Send the `220` greeting, leaving [`State::Greeting`].
#[must_use]
pub fn greet(policy: &Policy) -> Step {
    Step::respond(State::AwaitHello, Reply::greeting(&policy.domain_name))
}

/// Decide what to do with one line of input in `state`.
///
/// A command that is not legal in `state` is refused without changing anything, so repeating it
/// gets the same reply every time.
#[must_use]
pub fn transition(
    state: State,
    input: Input<'_>,
    transaction: &Transaction,
    policy: &Policy,
) -> Step {
    match state {
        State::Greeting => Step::respond(state, Reply::bad_sequence("Greeting not yet sent")),
        State::Closed => Step::silent(state, Action::None),
        State::InData => data(input, transaction, policy),
        State::AwaitHello | State::AwaitMailFrom | State::AwaitRcptTo => {
            let parsed = match input {
                Input::Line(line) => command::parse(line),
                Input::Overlong => Err(CommandError::LineTooLong {
                    max: max_lengths::COMMAND_LINE,
                }),
            };

            match parsed {
                Ok(request) => dispatch(state, request, transaction, policy),
                Err(error) => Step::respond(state, Reply::syntax_error(&error)),
            }
        }
    }
}

/// Handle a parsed command outside of mail data.
fn dispatch(state: State, request: Request, transaction: &Transaction, policy: &Policy) -> Step {
    match (state, request) {
        (_, Request::Quit) => Step::respond(State::Closed, Reply::closing(&policy.domain_name)),
        (_, Request::Noop) => Step::respond(state, Reply::ok()),
        (_, Request::Reset) => Step::new(State::AwaitMailFrom, Reply::ok(), Action::Reset),
        (State::AwaitHello, Request::Hello { extended, domain }) => Step::new(
            State::AwaitMailFrom,
            hello(extended, &domain, policy),
            Action::Hello(domain),
        ),
        (State::AwaitHello | State::AwaitMailFrom, Request::Auth(mechanism)) => {
            authenticate(state, mechanism, transaction, policy)
        }
        (State::AwaitMailFrom, Request::Mail { .. })
            if policy.require_auth && !transaction.is_authenticated() =>
        {
            Step::respond(
                state,
                Reply::new(Code::AuthRequired, "Authentication required"),
            )
        }
        (State::AwaitMailFrom, Request::Mail { sender }) => {
            Step::new(State::AwaitRcptTo, Reply::ok(), Action::Begin(sender))
        }
        (State::AwaitRcptTo, Request::Recipient { .. })
            if transaction.recipients().len() >= policy.max_recipients =>
        {
            Step::new(
                State::AwaitMailFrom,
                Reply::new(
                    Code::InsufficientStorage,
                    format!(
                        "Too many recipients (max {}), transaction aborted",
                        policy.max_recipients
                    ),
                ),
                Action::Reset,
            )
        }
        (State::AwaitRcptTo, Request::Recipient { recipient }) => {
            Step::new(state, Reply::ok(), Action::AddRecipient(recipient))
        }
        (State::AwaitRcptTo, Request::Data) if transaction.recipients().is_empty() => {
            Step::respond(state, Reply::bad_sequence("Need RCPT before DATA"))
        }
        (State::AwaitRcptTo, Request::Data) => {
            Step::respond(State::InData, Reply::start_mail_input())
        }
        (_, Request::Unrecognized(_)) => Step::respond(state, Reply::unrecognized()),
        _ => Step::respond(state, Reply::invalid_sequence()),
    }
}

/// The reply to `HELO` or `EHLO`.
///
/// `EHLO` lists the supported extensions on further lines.
///
/// [RFC 5321 section 4.1.1.1](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.1).
fn hello(extended: bool, client: &str, policy: &Policy) -> Reply {
    let mut lines: Vec<Cow<'static, str>> =
        vec![format!("{} greets {client}", policy.domain_name).into()];

    if extended && policy.auth == AuthSupport::Available {
        lines.push("AUTH PLAIN".into());
    }

    Reply::multiline(Code::Ok, lines)
}

/// Handle `AUTH`. Never changes state.
///
/// [RFC 4954 section 4](https://www.rfc-editor.org/rfc/rfc4954.html#section-4).
fn authenticate(
    state: State,
    mechanism: Mechanism,
    transaction: &Transaction,
    policy: &Policy,
) -> Step {
    match policy.auth {
        AuthSupport::Unavailable => {
            return Step::respond(
                state,
                Reply::new(Code::NotImplemented, "Command not implemented"),
            );
        }
        AuthSupport::EncryptionRequired => {
            return Step::respond(
                state,
                Reply::new(
                    Code::EncryptionRequired,
                    "Encryption required for requested authentication mechanism",
                ),
            );
        }
        AuthSupport::Available => (),
    }

    if transaction.is_authenticated() {
        return Step::respond(state, Reply::bad_sequence("Already authenticated"));
    }

    match mechanism {
        Mechanism::Plain(credentials) => Step::silent(state, Action::Authenticate(credentials)),
        Mechanism::Unsupported(_) => Step::respond(
            state,
            Reply::new(
                Code::ParameterNotImplemented,
                "Unrecognized authentication type",
            ),
        ),
    }
}

/// Handle one line of mail data.
///
/// Lines are collected silently. Once the body would exceed [`Policy::max_message_bytes`], the
/// rest of the data is discarded and the transaction is refused at the terminator.
fn data(input: Input<'_>, transaction: &Transaction, policy: &Policy) -> Step {
    let line = match input {
        Input::Line(DATA_TERMINATOR) if transaction.is_oversized() => {
            return Step::new(
                State::AwaitMailFrom,
                Reply::new(
                    Code::ExceededStorage,
                    format!(
                        "Message exceeds fixed maximum message size ({} bytes)",
                        policy.max_message_bytes
                    ),
                ),
                Action::Reset,
            );
        }
        Input::Line(DATA_TERMINATOR) => return Step::silent(State::AwaitMailFrom, Action::Finish),
        _ if transaction.is_oversized() => return Step::silent(State::InData, Action::None),
        Input::Overlong => return Step::silent(State::InData, Action::MarkOversized),
        Input::Line(line) => unstuff(line),
    };

    // Every line is stored with a trailing `\n`.
    if transaction.body().len() + line.len() + 1 > policy.max_message_bytes {
        Step::silent(State::InData, Action::MarkOversized)
    } else {
        Step::silent(State::InData, Action::AppendLine(line.to_string()))
    }
}
