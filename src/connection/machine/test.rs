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

//! Tests for [`super`].

use base64::{engine::general_purpose::STANDARD, Engine};

use super::*;

fn policy() -> Policy {
    Policy {
        domain_name: "mx.example.com".to_string(),
        max_recipients: 3,
        max_message_bytes: 32,
        require_auth: false,
        auth: AuthSupport::Available,
    }
}

/// Apply an [`Action`] the way a session would, without any I/O.
fn apply(transaction: &mut Transaction, action: Action) {
    match action {
        Action::None | Action::Authenticate(_) => (),
        Action::Hello(_) | Action::Reset => transaction.reset(),
        Action::Begin(sender) => transaction.begin(sender),
        Action::AddRecipient(recipient) => transaction.add_recipient(recipient),
        Action::AppendLine(line) => transaction.append_line(&line),
        Action::MarkOversized => transaction.mark_oversized(),
        Action::Finish => {
            let _message = transaction.finish();
        }
    }
}

/// Feed `lines` through [`transition`] from `state`, returning the final state and the code of
/// every reply.
fn run(
    state: State,
    transaction: &mut Transaction,
    policy: &Policy,
    lines: &[&str],
) -> (State, Vec<Option<Code>>) {
    let mut state = state;
    let mut codes = Vec::with_capacity(lines.len());

    for line in lines {
        let step = transition(state, Input::Line(line), transaction, policy);
        codes.push(step.reply.as_ref().map(Reply::code));
        apply(transaction, step.action);
        state = step.state;
    }

    (state, codes)
}

fn plain(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

#[test]
fn test_greeting() {
    let step = greet(&policy());

    assert_eq!(step.state, State::AwaitHello);
    assert_eq!(step.action, Action::None);
    assert_eq!(
        step.reply.map(|reply| reply.to_string()),
        Some("220 mx.example.com ESMTP ready".to_string())
    );

    // Nothing is accepted before the greeting is sent.
    let step = transition(
        State::Greeting,
        Input::Line("HELO client"),
        &Transaction::new(),
        &policy(),
    );
    assert_eq!(step.state, State::Greeting);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::BadSequence));
}

#[test]
fn test_full_transaction() {
    let mut transaction = Transaction::new();
    let (state, codes) = run(
        State::AwaitHello,
        &mut transaction,
        &policy(),
        &[
            "HELO client.example.com",
            "MAIL FROM:<a@x.com>",
            "RCPT TO:<b@y.com>",
            "RCPT TO:<c@y.com>",
            "DATA",
            "Hello world",
        ],
    );

    assert_eq!(state, State::InData);
    assert_eq!(
        codes,
        [
            Some(Code::Ok),
            Some(Code::Ok),
            Some(Code::Ok),
            Some(Code::Ok),
            Some(Code::StartMailInput),
            None,
        ]
    );
    assert_eq!(transaction.sender(), Some("a@x.com"));
    assert_eq!(transaction.recipients(), ["b@y.com", "c@y.com"]);
    assert_eq!(transaction.body(), "Hello world\n");

    let step = transition(State::InData, Input::Line("."), &transaction, &policy());
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply, None);
    assert_eq!(step.action, Action::Finish);
}

#[test]
fn test_rejection_is_idempotent() {
    let policy = policy();

    for (state, line) in [
        (State::AwaitHello, "MAIL FROM:<a@x.com>"),
        (State::AwaitHello, "DATA"),
        (State::AwaitMailFrom, "RCPT TO:<b@y.com>"),
        (State::AwaitMailFrom, "HELO again"),
        (State::AwaitRcptTo, "MAIL FROM:<a@x.com>"),
    ] {
        let mut transaction = Transaction::new();
        if state == State::AwaitRcptTo {
            transaction.begin("a@x.com".to_string());
        }
        let before = transaction.clone();

        let (after, codes) = run(state, &mut transaction, &policy, &[line, line, line]);

        assert_eq!(after, state, "{line:?} in {state:?}");
        assert_eq!(codes, [Some(Code::SyntaxError); 3], "{line:?} in {state:?}");
        assert_eq!(transaction, before, "{line:?} in {state:?}");
    }
}

#[test]
fn test_data_needs_a_recipient() {
    let mut transaction = Transaction::new();
    transaction.begin("a@x.com".to_string());

    let step = transition(State::AwaitRcptTo, Input::Line("DATA"), &transaction, &policy());

    assert_eq!(step.state, State::AwaitRcptTo);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::BadSequence));
    assert_eq!(step.action, Action::None);
}

#[test]
fn test_recipients_loop() {
    let mut transaction = Transaction::new();
    let (state, codes) = run(
        State::AwaitMailFrom,
        &mut transaction,
        &policy(),
        &["MAIL FROM:<a@x.com>", "RCPT TO:<b@y.com>", "RCPT TO:<b@y.com>"],
    );

    assert_eq!(state, State::AwaitRcptTo);
    assert_eq!(codes, [Some(Code::Ok); 3]);
    assert_eq!(transaction.recipients(), ["b@y.com", "b@y.com"]);
}

#[test]
fn test_too_many_recipients() {
    let mut transaction = Transaction::new();
    let (state, codes) = run(
        State::AwaitMailFrom,
        &mut transaction,
        &policy(),
        &[
            "MAIL FROM:<a@x.com>",
            "RCPT TO:<1@y.com>",
            "RCPT TO:<2@y.com>",
            "RCPT TO:<3@y.com>",
            "RCPT TO:<4@y.com>",
        ],
    );

    assert_eq!(state, State::AwaitMailFrom);
    assert_eq!(codes[4], Some(Code::InsufficientStorage));
    assert!(!transaction.is_open());
}

#[test]
fn test_data_lines() {
    let mut transaction = Transaction::new();
    transaction.begin("a@x.com".to_string());
    transaction.add_recipient("b@y.com".to_string());

    let (state, codes) = run(
        State::InData,
        &mut transaction,
        &policy(),
        &["..hello", "", "QUIT", "RSET", ". "],
    );

    // Every line is body content until a lone `.`.
    assert_eq!(state, State::InData);
    assert_eq!(codes, [None; 5]);
    assert_eq!(transaction.body(), ".hello\n\nQUIT\nRSET\n \n");
}

#[test]
fn test_oversized_message() {
    let mut transaction = Transaction::new();
    transaction.begin("a@x.com".to_string());
    transaction.add_recipient("b@y.com".to_string());

    let (state, codes) = run(
        State::InData,
        &mut transaction,
        &policy(),
        &["0123456789", "0123456789", "0123456789", "more"],
    );

    assert_eq!(state, State::InData);
    assert_eq!(codes, [None; 4]);
    assert!(transaction.is_oversized());
    assert_eq!(transaction.body(), "");

    let step = transition(State::InData, Input::Line("."), &transaction, &policy());
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::ExceededStorage));
    assert_eq!(step.action, Action::Reset);
}

#[test]
fn test_overlong_lines() {
    let mut transaction = Transaction::new();

    let step = transition(State::AwaitMailFrom, Input::Overlong, &transaction, &policy());
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::SyntaxError));

    transaction.begin("a@x.com".to_string());
    transaction.add_recipient("b@y.com".to_string());
    let step = transition(State::InData, Input::Overlong, &transaction, &policy());
    assert_eq!(step.state, State::InData);
    assert_eq!(step.reply, None);
    assert_eq!(step.action, Action::MarkOversized);
}

#[test]
fn test_reset() {
    let policy = policy();

    let step = transition(State::AwaitHello, Input::Line("RSET"), &Transaction::new(), &policy);
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::Ok));
    assert_eq!(step.action, Action::Reset);

    let mut transaction = Transaction::new();
    let (state, codes) = run(
        State::AwaitMailFrom,
        &mut transaction,
        &policy,
        &["MAIL FROM:<a@x.com>", "RCPT TO:<b@y.com>", "RSET"],
    );
    assert_eq!(state, State::AwaitMailFrom);
    assert_eq!(codes, [Some(Code::Ok); 3]);
    assert!(!transaction.is_open());
}

#[test]
fn test_quit_and_noop() {
    let policy = policy();

    for state in [State::AwaitHello, State::AwaitMailFrom, State::AwaitRcptTo] {
        let step = transition(state, Input::Line("NOOP"), &Transaction::new(), &policy);
        assert_eq!(step.state, state);
        assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::Ok));

        let step = transition(state, Input::Line("quit"), &Transaction::new(), &policy);
        assert_eq!(step.state, State::Closed);
        assert_eq!(
            step.reply.map(|reply| reply.to_string()),
            Some("221 mx.example.com closing connection".to_string())
        );
    }

    let step = transition(State::Closed, Input::Line("HELO x"), &Transaction::new(), &policy);
    assert_eq!(step.state, State::Closed);
    assert_eq!(step.reply, None);
}

#[test]
fn test_unrecognized_and_malformed() {
    let policy = policy();
    let transaction = Transaction::new();

    let step = transition(State::AwaitMailFrom, Input::Line("VRFY a"), &transaction, &policy);
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(
        step.reply.map(|reply| reply.to_string()),
        Some("500 Command not recognized".to_string())
    );

    let step = transition(State::AwaitMailFrom, Input::Line("MAIL a@x.com"), &transaction, &policy);
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::SyntaxError));
    assert_eq!(step.action, Action::None);
}

#[test]
fn test_ehlo_advertises_auth() {
    let mut policy = policy();

    let step = transition(
        State::AwaitHello,
        Input::Line("EHLO client"),
        &Transaction::new(),
        &policy,
    );
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.action, Action::Hello("client".to_string()));
    assert_eq!(
        step.reply.map(|reply| reply.to_string()),
        Some("250-mx.example.com greets client\r\n250 AUTH PLAIN".to_string())
    );

    policy.auth = AuthSupport::Unavailable;
    let step = transition(
        State::AwaitHello,
        Input::Line("EHLO client"),
        &Transaction::new(),
        &policy,
    );
    assert_eq!(
        step.reply.map(|reply| reply.to_string()),
        Some("250 mx.example.com greets client".to_string())
    );

    // `HELO` never lists extensions.
    policy.auth = AuthSupport::Available;
    let step = transition(
        State::AwaitHello,
        Input::Line("HELO client"),
        &Transaction::new(),
        &policy,
    );
    assert_eq!(
        step.reply.map(|reply| reply.to_string()),
        Some("250 mx.example.com greets client".to_string())
    );
}

#[test]
fn test_auth() {
    let mut policy = policy();
    let line = format!("AUTH PLAIN {}", plain("user", "secret"));
    let mut transaction = Transaction::new();

    let step = transition(State::AwaitMailFrom, Input::Line(&line), &transaction, &policy);
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply, None);
    assert_eq!(
        step.action,
        Action::Authenticate(Credentials::new("user", "secret"))
    );

    let step = transition(State::AwaitMailFrom, Input::Line("AUTH LOGIN"), &transaction, &policy);
    assert_eq!(
        step.reply.map(|reply| reply.code()),
        Some(Code::ParameterNotImplemented)
    );

    transaction.set_authenticated();
    let step = transition(State::AwaitMailFrom, Input::Line(&line), &transaction, &policy);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::BadSequence));

    policy.auth = AuthSupport::EncryptionRequired;
    let step = transition(State::AwaitMailFrom, Input::Line(&line), &Transaction::new(), &policy);
    assert_eq!(
        step.reply.map(|reply| reply.code()),
        Some(Code::EncryptionRequired)
    );

    policy.auth = AuthSupport::Unavailable;
    let step = transition(State::AwaitMailFrom, Input::Line(&line), &Transaction::new(), &policy);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::NotImplemented));

    // Not allowed once a transaction is open.
    policy.auth = AuthSupport::Available;
    let step = transition(State::AwaitRcptTo, Input::Line(&line), &Transaction::new(), &policy);
    assert_eq!(step.state, State::AwaitRcptTo);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::SyntaxError));
}

#[test]
fn test_require_auth() {
    let policy = Policy {
        require_auth: true,
        ..policy()
    };
    let mut transaction = Transaction::new();

    let step = transition(
        State::AwaitMailFrom,
        Input::Line("MAIL FROM:<a@x.com>"),
        &transaction,
        &policy,
    );
    assert_eq!(step.state, State::AwaitMailFrom);
    assert_eq!(step.reply.map(|reply| reply.code()), Some(Code::AuthRequired));

    transaction.set_authenticated();
    let step = transition(
        State::AwaitMailFrom,
        Input::Line("MAIL FROM:<a@x.com>"),
        &transaction,
        &policy,
    );
    assert_eq!(step.state, State::AwaitRcptTo);
    assert_eq!(step.action, Action::Begin("a@x.com".to_string()));
}

#[test]
fn test_policy_from_config() {
    let config = Config {
        allow_insecure_auth: false,
        ..Config::default()
    };

    assert_eq!(Policy::new(&config, false).auth, AuthSupport::Unavailable);
    assert_eq!(Policy::new(&config, true).auth, AuthSupport::EncryptionRequired);
    assert_eq!(Policy::new(&Config::default(), true).auth, AuthSupport::Available);
    assert_eq!(Policy::new(&config, true).max_recipients, config.max_recipients);
}
