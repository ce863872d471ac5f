//! Property-based tests for `chanflow`'s channel semantics.
//!
//! Coverage maps to the testable properties named in this crate's own
//! design ledger: FIFO ordering through a fixed buffer, the "never blocks"
//! guarantee of the unblocking buffer kinds, the closed sentinel, and
//! `alt`'s atomic single-commit guarantee across concurrent alts sharing a
//! channel.

use proptest::prelude::*;

use chanflow::{alt, buffer, dropping_buffer, sliding_buffer, AltOp, AltOutcome, Chan};

proptest! {
    /// A fixed buffer delivers exactly the values offered, in the order
    /// they were offered, once all are drained.
    #[test]
    fn fixed_buffer_preserves_fifo_order(values in prop::collection::vec(any::<i32>(), 0..64)) {
        let cap = values.len().max(1);
        let ch: Chan<i32> = Chan::new(buffer(cap).unwrap());
        for &v in &values {
            prop_assert!(ch.offer(v).unwrap());
        }
        let mut drained = Vec::new();
        for _ in 0..values.len() {
            drained.push(ch.poll().unwrap().unwrap());
        }
        prop_assert_eq!(drained, values);
    }

    /// A dropping buffer never rejects a put, however many values are
    /// offered past its capacity.
    #[test]
    fn dropping_buffer_put_never_fails(values in prop::collection::vec(any::<i32>(), 0..64), cap in 1usize..8) {
        let ch: Chan<i32> = Chan::new(dropping_buffer(cap).unwrap());
        for &v in &values {
            prop_assert!(ch.offer(v).unwrap());
        }
    }

    /// A sliding buffer always retains exactly the most recent `cap`
    /// values offered (or fewer, if fewer were ever offered).
    #[test]
    fn sliding_buffer_keeps_most_recent(values in prop::collection::vec(any::<i32>(), 0..64), cap in 1usize..8) {
        let ch: Chan<i32> = Chan::new(sliding_buffer(cap).unwrap());
        for &v in &values {
            prop_assert!(ch.offer(v).unwrap());
        }
        let mut drained = Vec::new();
        while let Some(v) = ch.poll().unwrap() {
            drained.push(v);
        }
        let expected: Vec<i32> = values[values.len().saturating_sub(cap)..].to_vec();
        prop_assert_eq!(drained, expected);
    }

    /// Once closed, every subsequent poll observes `None`, regardless of
    /// how many values were buffered before the close.
    #[test]
    fn closed_channel_always_polls_none_after_drained(values in prop::collection::vec(any::<i32>(), 0..16)) {
        let ch: Chan<i32> = Chan::new(buffer(values.len().max(1)).unwrap());
        for &v in &values {
            ch.offer(v).unwrap();
        }
        ch.close();
        for _ in 0..values.len() {
            prop_assert!(ch.poll().unwrap().is_some());
        }
        for _ in 0..4 {
            prop_assert_eq!(ch.poll().unwrap(), None);
        }
    }

    /// `alt` with a `default` never blocks: it resolves to the default
    /// whenever no channel among its operands is immediately ready.
    #[test]
    fn alt_with_default_never_blocks_on_empty_channels(n_channels in 1usize..6) {
        let chans: Vec<Chan<i32>> = (0..n_channels).map(|_| Chan::new(buffer(1).unwrap())).collect();
        let ops: Vec<AltOp<i32>> = chans.into_iter().map(AltOp::Get).collect();
        let rx = alt(ops, false, Some(-1)).unwrap();
        let outcome = rx.blocking_recv().unwrap();
        prop_assert!(matches!(outcome, AltOutcome::Default(-1)));
    }
}

/// Two concurrent `b_alt` calls racing to rendezvous on the same unbuffered
/// channel must see exactly one put-side and one get-side commit, never
/// both threads observing success on the same value slot twice.
#[test]
fn concurrent_alts_commit_exactly_once_each() {
    use chanflow::b_alt;

    for _ in 0..64 {
        let ch: Chan<i32> = Chan::unbuffered();
        let ch2 = ch.clone();
        let putter = std::thread::spawn(move || b_alt(vec![AltOp::Put(ch2, 7)], false, None));
        let getter = std::thread::spawn(move || b_alt(vec![AltOp::Get(ch)], false, None));

        let put_outcome = putter.join().unwrap().unwrap();
        let get_outcome = getter.join().unwrap().unwrap();

        assert!(matches!(put_outcome, AltOutcome::Put(true, _)));
        assert!(matches!(get_outcome, AltOutcome::Got(Some(7), _)));
    }
}
