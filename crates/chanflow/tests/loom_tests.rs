//! Loom-based concurrency tests for `chanflow`'s handler commit protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! `Handler`/`FlagHandler` are the one piece of this crate where two
//! threads can race to touch the same lock: two sibling `alt` branches (or
//! an `alt` branch and a standalone `put`/`get`) committing concurrently
//! against a shared `Flag`. This model mirrors that race in isolation,
//! using `loom`'s own `Mutex` rather than `std`'s, the same way the teacher
//! isolated its ring's producer/consumer race into a small standalone
//! model rather than model-checking the full production type.

#![cfg(feature = "loom")]

use loom::sync::{Arc, Mutex};
use loom::thread;

/// A minimal stand-in for `Flag` + two `FlagHandler` siblings: `active`
/// starts `true`, and `try_commit` is the same compare-and-consume shape
/// as `handler::try_commit`.
struct LoomFlag {
    active: Mutex<bool>,
}

impl LoomFlag {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(true),
        })
    }

    /// Returns `true` if this call won the commit.
    fn try_commit(&self) -> bool {
        let mut guard = self.active.lock().unwrap();
        if !*guard {
            return false;
        }
        *guard = false;
        true
    }
}

#[test]
fn exactly_one_sibling_commits() {
    loom::model(|| {
        let flag = LoomFlag::new();
        let f1 = flag.clone();
        let f2 = flag.clone();

        let t1 = thread::spawn(move || f1.try_commit());
        let t2 = thread::spawn(move || f2.try_commit());

        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();

        assert!(r1 ^ r2, "exactly one sibling must win the commit, got ({r1}, {r2})");
    });
}

#[test]
fn three_siblings_still_commit_exactly_once() {
    loom::model(|| {
        let flag = LoomFlag::new();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let f = flag.clone();
                thread::spawn(move || f.try_commit())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(wins, 1);
    });
}
