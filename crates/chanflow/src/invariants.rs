//! Debug assertion macros for channel invariants.
//!
//! These macros provide runtime checks for the invariants that `Chan` and
//! `Handler` must uphold. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release builds.

// =============================================================================
// Rendezvous asymmetry
// =============================================================================

/// Assert that an unbuffered channel never has both takers and putters parked
/// at once.
///
/// **Invariant**: for an unbuffered channel, `takes.is_empty() || puts.is_empty()`.
///
/// Used in: `ChanInner::put`/`ChanInner::get`, after the direct-rendezvous scan.
macro_rules! debug_assert_rendezvous_asymmetry {
    ($takes_len:expr, $puts_len:expr) => {
        debug_assert!(
            $takes_len == 0 || $puts_len == 0,
            "rendezvous asymmetry violated: {} parked takers and {} parked putters",
            $takes_len,
            $puts_len
        )
    };
}

// =============================================================================
// Buffer-first rule
// =============================================================================

/// Assert that a taker is only parked on a buffered channel when the buffer
/// is empty.
///
/// **Invariant**: `buf.is_some() ⟹ (takes.is_empty() || buf.len() == 0)`.
///
/// Used in: `ChanInner::get`, before enqueuing a parked taker.
macro_rules! debug_assert_takes_only_when_buf_empty {
    ($takes_len:expr, $buf_len:expr) => {
        debug_assert!(
            $takes_len == 0 || $buf_len == 0,
            "buffer-first rule violated: {} parked takers while buffer holds {} values",
            $takes_len,
            $buf_len
        )
    };
}

// =============================================================================
// Completion-once
// =============================================================================

/// Assert that the transducer's completion arity is never invoked twice.
///
/// **Invariant**: `xform_done` transitions `false -> true` at most once.
///
/// Used in: `ChanInner::complete_xform_if_ready`.
macro_rules! debug_assert_completes_once {
    ($already_done:expr) => {
        debug_assert!(
            !$already_done,
            "completion arity invoked more than once on the same channel"
        )
    };
}

// =============================================================================
// Lock ordering
// =============================================================================

/// Assert that two handler lock IDs are being acquired in ascending order.
///
/// **Invariant**: whenever two Handler locks are held simultaneously, the one
/// with the smaller `lock_id` is acquired first.
///
/// Used in: `handler::acquire_two`.
macro_rules! debug_assert_ascending_lock_order {
    ($first:expr, $second:expr) => {
        debug_assert!(
            $first <= $second,
            "lock order violated: acquired lock_id {} before {}",
            $first,
            $second
        )
    };
}

// =============================================================================
// Queue bound
// =============================================================================

/// Assert that a parked-operation queue never silently exceeds the
/// documented bound (callers must reject with `QueueSizeExceeded` first).
///
/// **Invariant**: `len <= MAX_QUEUE_SIZE`.
///
/// Used in: `ChanInner::put`/`ChanInner::get`, after a successful enqueue.
macro_rules! debug_assert_queue_bounded {
    ($len:expr, $max:expr) => {
        debug_assert!(
            $len <= $max,
            "queue bound violated: {} entries exceeds MAX_QUEUE_SIZE {}",
            $len,
            $max
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_ascending_lock_order;
pub(crate) use debug_assert_completes_once;
pub(crate) use debug_assert_queue_bounded;
pub(crate) use debug_assert_rendezvous_asymmetry;
pub(crate) use debug_assert_takes_only_when_buf_empty;
