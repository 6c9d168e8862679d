//! Integration tests for group-file membership
//!
//! Several threads join one group file at the same time through the real
//! flock-based filesystem; the file must end up with one header and every
//! member exactly once.

use collctl::group::{check_group, GroupJoiner, GROUP_HEADER};
use collctl::GroupError;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

#[test]
fn test_concurrent_joins_register_every_member_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("batch.erg");
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let joiner = GroupJoiner::local(Arc::new(AtomicBool::new(false)));
                barrier.wait();
                joiner.join(&path, &format!("member.{}.er", i))
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), workers + 1);
    assert_eq!(lines[0], GROUP_HEADER);
    assert_eq!(contents.matches(GROUP_HEADER).count(), 1);
    for i in 0..workers {
        let member = format!("member.{}.er", i);
        assert_eq!(lines.iter().filter(|l| **l == member).count(), 1);
    }
}

#[test]
fn test_two_joins_in_sequence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pair.erg");
    let joiner = GroupJoiner::local(Arc::new(AtomicBool::new(false)));
    joiner.join(&path, "/data/a.1.er").unwrap();
    joiner.join(&path, "/data/a.2.er").unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "#analyzer experiment group\n/data/a.1.er\n/data/a.2.er\n"
    );
}

#[test]
fn test_interrupt_while_file_stays_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stuck.erg");
    // a creator that never writes the header
    fs::File::create(&path).unwrap();

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let canceller = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(50));
        flag.store(true, Ordering::SeqCst);
    });

    let err = GroupJoiner::local(interrupted).join(&path, "m.1.er").unwrap_err();
    canceller.join().unwrap();
    assert!(matches!(err, GroupError::Interrupted));
    assert_eq!(fs::read_to_string(&path).unwrap(), "");
}

#[test]
fn test_timeout_on_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.erg");
    fs::File::create(&path).unwrap();
    let err = GroupJoiner::local(Arc::new(AtomicBool::new(false)))
        .with_max_attempts(3)
        .join(&path, "m.1.er")
        .unwrap_err();
    assert!(err.to_string().starts_with("Timed out: waiting for group file"));
}

#[test]
fn test_check_group_existing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ok.erg");
    fs::write(&path, "#analyzer experiment group\n").unwrap();
    assert!(check_group(&path).is_ok());
}
