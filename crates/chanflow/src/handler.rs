//! The one-shot commit token every pending `put`/`get`/`alt` operation rides on.
//!
//! A [`Handler<D>`] is acquired, checked for activity, and committed while its
//! internal lock is held; the commit extracts a delivery callback which is
//! invoked only after the lock is released (see `ChanInner`'s `put`/`get`).
//! `D` is whatever value the handler eventually delivers: `bool` for a put
//! (accepted / rejected-because-closed), `Option<Out>` for a get (a value, or
//! `None` for the closed sentinel).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_utils::CachePadded;

/// A handler's delivery callback, invoked exactly once, after commit.
pub type Callback<D> = Box<dyn FnOnce(D) + Send>;

static LOCK_ID: CachePadded<AtomicU64> = CachePadded::new(AtomicU64::new(1));

/// Allocates the next globally unique `lock_id`. IDs are never reused; the
/// total order they impose is what lets `acquire_two` avoid deadlock across
/// unrelated channels.
pub(crate) fn next_lock_id() -> u64 {
    LOCK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A one-shot commitment slot held by a parked `put`, `get`, or `alt` branch.
pub trait Handler<D>: Send + Sync {
    /// Globally unique, used only to totalise lock acquisition order.
    fn lock_id(&self) -> u64;

    /// Whether the owning operation is allowed to park (`false` for
    /// `offer`/`poll`, and for every branch of an `alt` carrying a
    /// `default`).
    fn is_blockable(&self) -> bool;

    /// Acquires the handler's internal lock, returning a ticket through
    /// which `is_active`/`commit` can be observed while the lock is held.
    fn acquire(&self) -> Box<dyn HandlerTicket<D> + '_>;
}

/// The lock held over a [`Handler`] while its activity is inspected or it is
/// committed. Dropping the ticket releases the lock.
pub trait HandlerTicket<D> {
    /// `true` until this handler (or, for a flag-backed sibling, any handler
    /// sharing its flag) has committed.
    fn is_active(&self) -> bool;

    /// Commits the handler, flipping `is_active` to `false` forever and
    /// returning its delivery callback.
    ///
    /// # Panics
    ///
    /// Panics if the handler is not active.
    fn commit(&mut self) -> Callback<D>;
}

struct FnHandlerState<D> {
    active: bool,
    callback: Option<Callback<D>>,
}

/// An always-active-until-committed handler backing a standalone
/// `put`/`get`/`b_put`/`b_get`/`f_put`/`f_get` call.
pub struct FnHandler<D> {
    lock_id: u64,
    blockable: bool,
    state: Mutex<FnHandlerState<D>>,
}

impl<D: Send + 'static> FnHandler<D> {
    pub fn new(blockable: bool, callback: Callback<D>) -> Self {
        Self {
            lock_id: next_lock_id(),
            blockable,
            state: Mutex::new(FnHandlerState {
                active: true,
                callback: Some(callback),
            }),
        }
    }
}

struct FnTicket<'a, D> {
    guard: MutexGuard<'a, FnHandlerState<D>>,
}

impl<'a, D> HandlerTicket<D> for FnTicket<'a, D> {
    fn is_active(&self) -> bool {
        self.guard.active
    }

    fn commit(&mut self) -> Callback<D> {
        assert!(self.guard.active, "commit on inactive handler");
        self.guard.active = false;
        self.guard.callback.take().expect("callback already taken")
    }
}

impl<D: Send + 'static> Handler<D> for FnHandler<D> {
    fn lock_id(&self) -> u64 {
        self.lock_id
    }

    fn is_blockable(&self) -> bool {
        self.blockable
    }

    fn acquire(&self) -> Box<dyn HandlerTicket<D> + '_> {
        Box::new(FnTicket {
            guard: self.state.lock().unwrap(),
        })
    }
}

/// The commit flag shared by every sibling handler built for one `alt` call.
/// The first sibling to commit flips this to inactive; every other sibling
/// then observes `is_active() == false` and is skipped.
pub struct Flag {
    active: Mutex<bool>,
}

impl Flag {
    pub fn new() -> Arc<Flag> {
        Arc::new(Flag {
            active: Mutex::new(true),
        })
    }
}

/// A handler backed by a shared [`Flag`], used for every branch of an `alt`.
pub struct FlagHandler<D> {
    lock_id: u64,
    blockable: bool,
    flag: Arc<Flag>,
    callback: Mutex<Option<Callback<D>>>,
}

impl<D: Send + 'static> FlagHandler<D> {
    pub fn new(flag: Arc<Flag>, blockable: bool, callback: Callback<D>) -> Self {
        Self {
            lock_id: next_lock_id(),
            blockable,
            flag,
            callback: Mutex::new(Some(callback)),
        }
    }
}

struct FlagTicket<'a, D> {
    guard: MutexGuard<'a, bool>,
    callback: &'a Mutex<Option<Callback<D>>>,
}

impl<'a, D> HandlerTicket<D> for FlagTicket<'a, D> {
    fn is_active(&self) -> bool {
        *self.guard
    }

    fn commit(&mut self) -> Callback<D> {
        assert!(*self.guard, "commit on inactive handler");
        *self.guard = false;
        self.callback
            .lock()
            .unwrap()
            .take()
            .expect("callback already taken")
    }
}

impl<D: Send + 'static> Handler<D> for FlagHandler<D> {
    fn lock_id(&self) -> u64 {
        self.lock_id
    }

    fn is_blockable(&self) -> bool {
        self.blockable
    }

    fn acquire(&self) -> Box<dyn HandlerTicket<D> + '_> {
        Box::new(FlagTicket {
            guard: self.flag.active.lock().unwrap(),
            callback: &self.callback,
        })
    }
}

/// Acquires two handlers' locks in ascending `lock_id` order, returning
/// their tickets in the original `(a, b)` order regardless of which was
/// locked first. This is the building block for direct rendezvous (matching
/// a putter against a parked taker or vice versa) and must always be used
/// whenever two handler locks are held at once.
pub(crate) fn acquire_two<'a, D1, D2>(
    a: &'a dyn Handler<D1>,
    b: &'a dyn Handler<D2>,
) -> (Box<dyn HandlerTicket<D1> + 'a>, Box<dyn HandlerTicket<D2> + 'a>) {
    if a.lock_id() <= b.lock_id() {
        crate::invariants::debug_assert_ascending_lock_order!(a.lock_id(), b.lock_id());
        let ta = a.acquire();
        let tb = b.acquire();
        (ta, tb)
    } else {
        crate::invariants::debug_assert_ascending_lock_order!(b.lock_id(), a.lock_id());
        let tb = b.acquire();
        let ta = a.acquire();
        (ta, tb)
    }
}

/// Acquires a single handler's lock and, if still active, commits it and
/// invokes its delivery callback with `val`. Mirrors the reference
/// implementation's `_fail_op`: returning `false` here is how a caller (in
/// particular `alt`) learns that this operation remains uncommitted, rather
/// than having actually failed.
pub(crate) fn try_commit<D>(handler: &dyn Handler<D>, val: D) -> bool {
    let mut ticket = handler.acquire();
    if !ticket.is_active() {
        return false;
    }
    let cb = ticket.commit();
    drop(ticket);
    cb(val);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn fn_handler_commits_once() {
        let delivered = Arc::new(AtomicBool::new(false));
        let d = delivered.clone();
        let h: FnHandler<bool> = FnHandler::new(true, Box::new(move |v| d.store(v, Ordering::SeqCst)));
        assert!(try_commit(&h, true));
        assert!(delivered.load(Ordering::SeqCst));
        // A second commit attempt must observe the handler as inactive.
        let mut ticket = h.acquire();
        assert!(!ticket.is_active());
    }

    #[test]
    fn flag_handler_siblings_share_commit() {
        let flag = Flag::new();
        let a: FlagHandler<bool> = FlagHandler::new(flag.clone(), true, Box::new(|_| {}));
        let b: FlagHandler<bool> = FlagHandler::new(flag, true, Box::new(|_| {}));

        assert!(try_commit(&a, true));
        // b shares a's flag, so it must now be inactive despite never being
        // committed directly.
        assert!(!try_commit(&b, false));
    }

    #[test]
    fn acquire_two_orders_by_lock_id() {
        let a: FnHandler<bool> = FnHandler::new(true, Box::new(|_| {}));
        let b: FnHandler<bool> = FnHandler::new(true, Box::new(|_| {}));
        let (ta, tb) = acquire_two(&a, &b);
        assert!(ta.is_active());
        assert!(tb.is_active());
    }
}
