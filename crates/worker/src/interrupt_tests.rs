// SPDX-License-Identifier: MIT

use super::*;

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use hl_wire::{encode, Envelope, FunctionCall};

fn send(stream: &mut UnixStream, envelope: &Envelope) {
    stream.write_all(&encode(envelope).unwrap()).unwrap();
}

fn break_request() -> Envelope {
    Envelope {
        id: 0,
        wait: false,
        op: Operation::FunctionCall(FunctionCall::system(BREAK_FUNCTION)),
    }
}

fn wait_for(flag: &CancelFlag) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if flag.is_set() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn flag_take_clears_it() {
    let flag = CancelFlag::new();
    assert!(!flag.is_set());
    flag.set();
    assert!(flag.take());
    assert!(!flag.is_set());
    assert!(!flag.take());
}

#[test]
fn break_command_sets_the_flag() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("m.sock");
    let flag = CancelFlag::new();
    let _thread = spawn(path.clone(), flag.clone()).unwrap();

    let mut client = UnixStream::connect(&path).unwrap();
    send(&mut client, &break_request());
    assert!(wait_for(&flag), "flag never set");
}

#[test]
fn unrelated_commands_do_not_set_the_flag() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("m.sock");
    let flag = CancelFlag::new();
    let _thread = spawn(path.clone(), flag.clone()).unwrap();

    let mut client = UnixStream::connect(&path).unwrap();
    send(&mut client, &Envelope {
        id: 1,
        wait: false,
        op: Operation::FunctionCall(FunctionCall::system("get-language")),
    });
    std::thread::sleep(Duration::from_millis(150));
    assert!(!flag.is_set());

    // the channel still works afterwards
    send(&mut client, &break_request());
    assert!(wait_for(&flag), "flag never set");
}

#[test]
fn channel_survives_client_reconnect() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("m.sock");
    let flag = CancelFlag::new();
    let _thread = spawn(path.clone(), flag.clone()).unwrap();

    let first = UnixStream::connect(&path).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    drop(first);
    std::thread::sleep(Duration::from_millis(100));

    let mut second = UnixStream::connect(&path).unwrap();
    send(&mut second, &break_request());
    assert!(wait_for(&flag), "flag never set after reconnect");
}
