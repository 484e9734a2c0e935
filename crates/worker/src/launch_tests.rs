// SPDX-License-Identifier: MIT

use super::*;

use std::os::unix::net::UnixListener;

#[test]
fn worker_command_carries_endpoint_and_runtime_home() {
    let command = worker_command(Path::new("/usr/bin/hlw"), "bridge-1", Path::new("/opt/lang"));
    let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
    assert_eq!(args, vec!["-p", "bridge-1", "-r", "/opt/lang"]);
    assert_eq!(command.get_program(), "/usr/bin/hlw");
}

#[test]
fn handle_reports_a_finished_worker() {
    let mut handle = WorkerHandle::spawn(&mut Command::new("true")).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.exited() {
        assert!(Instant::now() < deadline, "worker never exited");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn dropping_the_handle_kills_a_running_worker() {
    let handle = WorkerHandle::spawn(Command::new("sleep").arg("600")).unwrap();
    let pid = handle.pid();
    drop(handle);
    // the group leader must be gone (ESRCH) or a reaped zombie
    let alive = nix::sys::signal::kill(Pid::from_raw(pid as i32), None).is_ok();
    assert!(!alive, "worker survived handle drop");
}

#[test]
fn connect_with_retry_times_out_on_a_missing_endpoint() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = connect_with_retry(&dir.path().join("absent.sock"), Duration::from_millis(100))
        .unwrap_err();
    assert!(matches!(err, LaunchError::ConnectTimeout(_)));
}

#[test]
fn connect_with_retry_waits_for_a_late_listener() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("late.sock");
    let binder = {
        let path = path.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            UnixListener::bind(path).unwrap()
        })
    };
    let stream = connect_with_retry(&path, Duration::from_secs(2));
    assert!(stream.is_ok());
    binder.join().unwrap();
}
