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

use std::{error::Error, sync::Arc};

use futures_util::{pin_mut, StreamExt};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use crate::{
    config::Config,
    connection::CloseReason,
    read_line,
    store::MemoryStore,
    write_line,
    Inbox,
};


type Result = std::result::Result<(), Box<dyn Error>>;

/// Bind an ephemeral port and serve every connection to it in the background.
///
/// Returns the address to connect to, and a task that yields the [`CloseReason`] of every session
/// once `sessions` of them have ended.
async fn spawn_server(
    inbox: Inbox,
    sessions: usize,
) -> std::io::Result<(std::net::SocketAddr, JoinHandle<Vec<CloseReason>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let server = tokio::spawn(async move {
        let stream = crate::listen(listener, inbox);
        pin_mut!(stream);

        let mut handles = Vec::with_capacity(sessions);
        for _ in 0..sessions {
            // Get the `Next` and unwrap the [`TcpListener::accept`].
            handles.push(stream.next().await.unwrap().unwrap());
        }

        let mut reasons = Vec::with_capacity(sessions);
        for handle in handles {
            // Unwrap the [`JoinHandle`], then the session itself.
            reasons.push(handle.await.unwrap().unwrap());
        }
        reasons
    });

    Ok((address, server))
}

fn inbox(store: Arc<MemoryStore>) -> Inbox {
    Inbox::new(
        Config {
            domain_name: "mx.example.com".to_string(),
            ..Config::default()
        },
        store,
    )
}

// 4.5.1 Minimum Implementation:
//
// - [x] `EHLO`
// - [x] `HELO`
// - [x] `MAIL`
// - [x] `RCPT`
// - [x] `DATA`
// - [x] `RSET`
// - [x] `NOOP`
// - [ ] `VRFY`
// - [x] `QUIT`
//
// <https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.1>
#[tokio::test]
async fn test_listen() -> Result {
    let store = Arc::new(MemoryStore::new());
    let (address, server) = spawn_server(inbox(store.clone()), 1).await?;

    let mut stream = TcpStream::connect(address).await?;
    let (read_stream, mut write_stream) = stream.split();

    let mut reader = BufReader::new(read_stream);

    assert!(is_valid_response::server_greeting(
        &read_line!(reader).await?
    ));

    write_line!(write_stream, "EHLO client.example.com")?;
    let mut reply = read_line!(reader).await?;
    while is_valid_response::continues(&reply) {
        reply = read_line!(reader).await?;
    }
    assert!(is_valid_response::code(&reply, 250));

    write_line!(write_stream, "NOOP")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "MAIL FROM:<a@x.com>")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "RCPT TO:<b@y.com>")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "RCPT TO:<c@y.com>")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "DATA")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 354));

    write_line!(write_stream, "Hello world")?;
    write_line!(write_stream, ".")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "RSET")?;
    assert!(is_valid_response::code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "QUIT")?;
    assert!(is_valid_response::quit(&read_line!(reader).await?));

    // The server closes the connection after `QUIT`.
    assert_eq!(read_line!(reader).await?, "");
    assert_eq!(server.await?, [CloseReason::Quit]);

    let messages = store.messages()?;
    assert_eq!(messages.len(), 1);
    let message = &messages[0].1;
    assert_eq!(message.sender(), "a@x.com");
    assert_eq!(message.recipients(), ["b@y.com", "c@y.com"]);
    assert_eq!(message.body(), "Hello world\n");

    Ok(())
}

/// Sessions run independently, so a slow client does not hold up the others.
#[tokio::test]
async fn test_concurrent_sessions() -> Result {
    const CLIENTS: usize = 8;

    let store = Arc::new(MemoryStore::new());
    let (address, server) = spawn_server(inbox(store.clone()), CLIENTS + 1).await?;

    // Holds its connection open, mid-transaction, until the rest are done.
    let mut idle = TcpStream::connect(address).await?;
    let (idle_read, mut idle_write) = idle.split();
    let mut idle_reader = BufReader::new(idle_read);
    assert!(is_valid_response::server_greeting(
        &read_line!(idle_reader).await?
    ));
    write_line!(idle_write, "HELO idle")?;
    assert!(is_valid_response::code(&read_line!(idle_reader).await?, 250));

    let clients: Vec<_> = (0..CLIENTS)
        .map(|client| {
            tokio::spawn(async move {
                let mut stream = TcpStream::connect(address).await?;
                let (read_stream, mut write_stream) = stream.split();
                let mut reader = BufReader::new(read_stream);

                let script = format!(
                    "HELO client{client}\r\nMAIL FROM:<{client}@x.com>\r\nRCPT TO:<b@y.com>\r\n\
                     DATA\r\nmessage {client}\r\n.\r\nQUIT\r\n"
                );
                tokio::io::AsyncWriteExt::write_all(&mut write_stream, script.as_bytes()).await?;

                let mut replies = Vec::new();
                let mut line = String::new();
                while reader.read_line(&mut line).await? != 0 {
                    replies.push(std::mem::take(&mut line));
                }

                std::io::Result::Ok(replies)
            })
        })
        .collect();

    for client in clients {
        let replies = client.await??;
        let codes: Vec<_> = replies.iter().map(|reply| &reply[..3]).collect();
        assert_eq!(codes, ["220", "250", "250", "250", "354", "250", "221"]);
    }

    write_line!(idle_write, "QUIT")?;
    assert!(is_valid_response::quit(&read_line!(idle_reader).await?));

    let reasons = server.await?;
    assert_eq!(reasons.len(), CLIENTS + 1);
    assert!(reasons.iter().all(|reason| *reason == CloseReason::Quit));

    let mut bodies: Vec<_> = store
        .messages()?
        .iter()
        .map(|(_, message)| message.body().to_string())
        .collect();
    bodies.sort();
    let mut expected: Vec<_> = (0..CLIENTS).map(|client| format!("message {client}\n")).collect();
    expected.sort();
    assert_eq!(bodies, expected);

    Ok(())
}
