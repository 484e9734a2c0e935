// SPDX-License-Identifier: MIT

use super::*;

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Instant;

use hl_wire::{decode, ConsoleMessage, Decoded};

use crate::pool::{PipePool, PRIMARY_SLOT};

struct Fixture {
    pool: PipePool,
    _dir: tempfile::TempDir,
}

fn fixture_with_client() -> (Fixture, UnixStream) {
    let dir = tempfile::TempDir::new().unwrap();
    let mut pool =
        PipePool::bind(&dir.path().join("c.sock"), &dir.path().join("c-cb.sock")).unwrap();
    let client = UnixStream::connect(dir.path().join("c.sock")).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if pool.accept().unwrap() == Some(PRIMARY_SLOT) {
            break;
        }
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(1));
    }
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    (Fixture { pool, _dir: dir }, client)
}

fn recv(stream: &mut UnixStream) -> Envelope {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match decode(&buf).unwrap() {
            Decoded::Frame { envelope, .. } => return envelope,
            Decoded::Incomplete => {}
            Decoded::Corrupt { .. } => panic!("corrupt frame"),
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "stream closed");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn drain_writes(pool: &mut PipePool, slot: usize) {
    while pool.instance(slot).writing() {
        pool.instance_mut(slot).advance_write().unwrap();
    }
}

#[test]
fn output_buffers_until_a_client_attaches() {
    let (mut fx, mut client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    assert!(!console.attached());

    console.prompt(&mut fx.pool, "> ", 1).unwrap();
    console
        .push(&mut fx.pool, &Envelope {
            id: 0,
            wait: false,
            op: Operation::Console(ConsoleMessage::Stdout("hello".into())),
        })
        .unwrap();
    assert_eq!(console.pending_len(), 2);

    console.attach(&mut fx.pool, PRIMARY_SLOT);
    assert_eq!(console.pending_len(), 0);
    drain_writes(&mut fx.pool, PRIMARY_SLOT);

    // flushed in original order
    let first = recv(&mut client);
    assert!(matches!(first.op, Operation::Console(ConsoleMessage::Prompt(_))));
    let second = recv(&mut client);
    match second.op {
        Operation::Console(ConsoleMessage::Stdout(text)) => assert_eq!(text, "hello"),
        other => panic!("unexpected op: {other:?}"),
    }
}

#[test]
fn attached_client_receives_output_directly() {
    let (mut fx, mut client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    console.attach(&mut fx.pool, PRIMARY_SLOT);

    console.prompt(&mut fx.pool, ">> ", 5).unwrap();
    drain_writes(&mut fx.pool, PRIMARY_SLOT);

    let envelope = recv(&mut client);
    assert_eq!(envelope.id, 5);
    match envelope.op {
        Operation::Console(ConsoleMessage::Prompt(text)) => assert_eq!(text, ">> "),
        other => panic!("unexpected op: {other:?}"),
    }
}

#[test]
fn detach_returns_to_buffering() {
    let (mut fx, _client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    console.attach(&mut fx.pool, PRIMARY_SLOT);
    console.detach();

    console.prompt(&mut fx.pool, "> ", 1).unwrap();
    assert_eq!(console.pending_len(), 1);
}

#[test]
fn control_messages_use_the_system_target() {
    let (mut fx, mut client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    console.attach(&mut fx.pool, PRIMARY_SLOT);

    console.control(&mut fx.pool, "shutdown").unwrap();
    drain_writes(&mut fx.pool, PRIMARY_SLOT);

    match recv(&mut client).op {
        Operation::FunctionCall(call) => {
            assert_eq!(call.function, "shutdown");
            assert_eq!(call.target, hl_wire::CallTarget::System);
        }
        other => panic!("unexpected op: {other:?}"),
    }
}

#[test]
fn request_completes_a_synchronous_round_trip() {
    let (mut fx, mut client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    console.attach(&mut fx.pool, PRIMARY_SLOT);

    let replier = std::thread::spawn(move || {
        let request = recv(&mut client);
        assert_eq!(request.id, 77);
        let reply = Envelope::result(77, hl_wire::Value::str("line"));
        client.write_all(&encode(&reply).unwrap()).unwrap();
    });

    let request = Envelope {
        id: 77,
        wait: true,
        op: Operation::FunctionCall(FunctionCall::system("read-line")),
    };
    let reply = console.request(&mut fx.pool, &request, Duration::from_secs(2)).unwrap();
    assert_eq!(reply.id, 77);
    replier.join().unwrap();
}

#[test]
fn request_without_a_client_fails_fast() {
    let (mut fx, _client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    let request = Envelope {
        id: 1,
        wait: true,
        op: Operation::FunctionCall(FunctionCall::system("read-line")),
    };
    let err = console.request(&mut fx.pool, &request, Duration::from_millis(50)).unwrap_err();
    assert!(matches!(err, ConsoleError::NotAttached));
}

#[test]
fn request_times_out_on_a_silent_client() {
    let (mut fx, _client) = fixture_with_client();
    let mut console = ConsoleSession::new();
    console.attach(&mut fx.pool, PRIMARY_SLOT);
    let request = Envelope {
        id: 2,
        wait: true,
        op: Operation::FunctionCall(FunctionCall::system("read-line")),
    };
    let err = console.request(&mut fx.pool, &request, Duration::from_millis(100)).unwrap_err();
    assert!(matches!(err, ConsoleError::Timeout));
}
