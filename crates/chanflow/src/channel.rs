//! `Chan`: the CSP channel itself.
//!
//! Grounded on `chanpy.channel.Chan`'s `_put`/`_get`/`_close` protocol, but
//! restated for a statically-typed `Handler<D>` and a `Mutex`-protected
//! queue-and-buffer model rather than the reference implementation's
//! single-threaded-by-convention deque mutation. Unlike the ring-buffer
//! channel this crate started from, there is no lock-free fast path here:
//! every operation takes `inner`'s lock, does its bookkeeping, and releases
//! it before any delivery callback runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::buffer::Buffer;
use crate::error::{ChanError, ChanResult};
use crate::handler::{self, FnHandler, Handler};
use crate::invariants::{
    debug_assert_completes_once, debug_assert_queue_bounded, debug_assert_rendezvous_asymmetry,
    debug_assert_takes_only_when_buf_empty,
};
use crate::promise::Promise;
use crate::xform::{self, BoxStep, Xform};

/// The largest number of parked puts or parked gets a single channel will
/// hold before `put`/`get` fail with [`ChanError::QueueSizeExceeded`].
pub const MAX_QUEUE_SIZE: usize = 1024;

/// A user exception handler: given the panic payload a transducer step
/// raised, either returns a replacement value to push into the buffer
/// (`Some`), asks for the value to be dropped (`None`), or the handler
/// itself panics/resumes the unwind to propagate it.
pub type ExHandler<Out> = Arc<dyn Fn(Box<dyn std::any::Any + Send>) -> Option<Out> + Send + Sync>;

pub(crate) type PutHandler = Box<dyn Handler<bool> + Send + Sync>;
pub(crate) type TakeHandler<Out> = Box<dyn Handler<Option<Out>> + Send + Sync>;

pub(crate) enum Outcome {
    Committed,
    Parked,
}

fn commit_outcome(committed: bool) -> Outcome {
    if committed {
        Outcome::Committed
    } else {
        Outcome::Parked
    }
}

struct ChanInner<In, Out> {
    buf: Option<Box<dyn Buffer<Out>>>,
    takes: VecDeque<TakeHandler<Out>>,
    puts: VecDeque<(PutHandler, In)>,
    closed: bool,
    xform_done: bool,
    rf: BoxStep<In>,
    sink: Arc<Mutex<Vec<Out>>>,
    ex_handler: Option<ExHandler<Out>>,
}

impl<In, Out> ChanInner<In, Out> {
    fn prune(&mut self) {
        self.takes.retain(|h| h.acquire().is_active());
        self.puts.retain(|(h, _)| h.acquire().is_active());
    }

    /// Runs `val` through the rf chain, draining whatever it emits into the
    /// real buffer. Returns whether the chain signalled `Reduced`.
    fn feed_through_rf(&mut self, val: In) -> bool {
        let rf = &mut self.rf;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rf.step(val)));
        match result {
            Ok(reduced) => {
                self.drain_sink_into_buf();
                reduced
            }
            Err(payload) => {
                self.handle_transducer_panic(payload);
                false
            }
        }
    }

    fn drain_sink_into_buf(&mut self) {
        let produced = std::mem::take(&mut *self.sink.lock().unwrap());
        for v in produced {
            self.buf
                .as_mut()
                .expect("a channel with an embedded transducer always has a buffer")
                .put(v);
        }
    }

    fn handle_transducer_panic(&mut self, payload: Box<dyn std::any::Any + Send>) {
        match &self.ex_handler {
            Some(h) => {
                if let Some(recovered) = h(payload) {
                    self.buf
                        .as_mut()
                        .expect("a channel with an embedded transducer always has a buffer")
                        .put(recovered);
                }
            }
            None => std::panic::resume_unwind(payload),
        }
    }

    fn complete_xform_if_ready(&mut self) {
        if !(self.closed && self.puts.is_empty() && !self.xform_done) {
            return;
        }
        debug_assert_completes_once!(self.xform_done);
        self.xform_done = true;
        let rf = &mut self.rf;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| rf.complete()));
        if let Err(payload) = result {
            self.handle_transducer_panic(payload);
        }
        self.drain_sink_into_buf();
    }

    /// Commits every remaining parked putter with `false` and marks the
    /// channel closed. Called once the rf chain signals `Reduced`: no
    /// further value will ever be accepted.
    fn reduce_close(&mut self) {
        for (putter, _) in self.puts.drain(..) {
            handler::try_commit(putter.as_ref(), false);
        }
        self.closed = true;
    }

    /// After a value lands in the buffer, hands buffered values to as many
    /// parked takers as possible.
    fn deliver_buf_to_takers(&mut self) {
        loop {
            let buf_len = self.buf.as_ref().map_or(0, |b| b.len());
            if buf_len == 0 || self.takes.is_empty() {
                break;
            }
            let taker = self.takes.pop_front().unwrap();
            let mut ticket = taker.acquire();
            if ticket.is_active() {
                let v = self.buf.as_mut().unwrap().get();
                let cb = ticket.commit();
                drop(ticket);
                cb(Some(v));
            }
        }
    }

    /// After a value leaves the buffer, refills it from as many parked
    /// putters as the buffer has room for.
    fn refill_buf_from_puts(&mut self) {
        loop {
            let room = matches!(&self.buf, Some(b) if !b.is_full());
            if !room || self.puts.is_empty() {
                break;
            }
            let (putter, val) = self.puts.pop_front().unwrap();
            if handler::try_commit(putter.as_ref(), true) && self.feed_through_rf(val) {
                self.reduce_close();
                break;
            }
        }
    }

    /// `finalize_if_unmatched` controls what happens to a non-blockable
    /// handler that finds no immediate match: `offer` wants a definitive
    /// answer (commit with `false`/`None` right away), while `alt` with a
    /// `default` wants the handler left uncommitted so it can try the next
    /// operation, or fall back to the default value, instead.
    fn do_put(
        &mut self,
        put_handler: PutHandler,
        val: In,
        finalize_if_unmatched: bool,
    ) -> ChanResult<Outcome> {
        self.prune();
        debug_assert_rendezvous_asymmetry!(
            if self.buf.is_none() { self.takes.len() } else { 0 },
            if self.buf.is_none() { self.puts.len() } else { 0 }
        );

        if self.closed {
            return Ok(commit_outcome(handler::try_commit(put_handler.as_ref(), false)));
        }

        let buf_not_full = matches!(&self.buf, Some(b) if !b.is_full());
        if buf_not_full {
            if !handler::try_commit(put_handler.as_ref(), true) {
                return Ok(Outcome::Parked);
            }
            if self.feed_through_rf(val) {
                self.reduce_close();
            } else {
                self.deliver_buf_to_takers();
            }
            return Ok(Outcome::Committed);
        }

        if self.buf.is_none() {
            while let Some(taker) = self.takes.pop_front() {
                let (mut pt, mut tt) = handler::acquire_two(put_handler.as_ref(), taker.as_ref());
                if !pt.is_active() {
                    drop(pt);
                    drop(tt);
                    self.takes.push_front(taker);
                    return Ok(Outcome::Parked);
                }
                if tt.is_active() {
                    let put_cb = pt.commit();
                    let take_cb = tt.commit();
                    drop(pt);
                    drop(tt);
                    take_cb(Some(val));
                    put_cb(true);
                    return Ok(Outcome::Committed);
                }
            }
        }

        if !put_handler.is_blockable() {
            if finalize_if_unmatched {
                return Ok(commit_outcome(handler::try_commit(put_handler.as_ref(), false)));
            }
            return Ok(Outcome::Parked);
        }

        if self.puts.len() >= MAX_QUEUE_SIZE {
            return Err(ChanError::QueueSizeExceeded { max: MAX_QUEUE_SIZE });
        }
        self.puts.push_back((put_handler, val));
        debug_assert_queue_bounded!(self.puts.len(), MAX_QUEUE_SIZE);
        Ok(Outcome::Parked)
    }

    fn do_get(
        &mut self,
        take_handler: TakeHandler<Out>,
        finalize_if_unmatched: bool,
    ) -> ChanResult<Outcome> {
        self.prune();
        debug_assert_takes_only_when_buf_empty!(
            self.takes.len(),
            self.buf.as_ref().map_or(usize::MAX, |b| b.len())
        );

        if let Some(buf) = &self.buf {
            if buf.len() > 0 {
                let mut ticket = take_handler.acquire();
                if !ticket.is_active() {
                    return Ok(Outcome::Parked);
                }
                let v = self.buf.as_mut().unwrap().get();
                let cb = ticket.commit();
                drop(ticket);
                cb(Some(v));
                self.refill_buf_from_puts();
                self.complete_xform_if_ready();
                return Ok(Outcome::Committed);
            }
        }

        if self.buf.is_none() {
            while let Some((putter, val)) = self.puts.pop_front() {
                let (mut tt, mut pt) = handler::acquire_two(take_handler.as_ref(), putter.as_ref());
                if !tt.is_active() {
                    drop(tt);
                    drop(pt);
                    self.puts.push_front((putter, val));
                    return Ok(Outcome::Parked);
                }
                if pt.is_active() {
                    let take_cb = tt.commit();
                    let put_cb = pt.commit();
                    drop(tt);
                    drop(pt);
                    put_cb(true);
                    take_cb(Some(val));
                    return Ok(Outcome::Committed);
                }
            }
        }

        if self.closed {
            return Ok(commit_outcome(handler::try_commit(take_handler.as_ref(), None)));
        }
        if !take_handler.is_blockable() {
            if finalize_if_unmatched {
                return Ok(commit_outcome(handler::try_commit(take_handler.as_ref(), None)));
            }
            return Ok(Outcome::Parked);
        }

        if self.takes.len() >= MAX_QUEUE_SIZE {
            return Err(ChanError::QueueSizeExceeded { max: MAX_QUEUE_SIZE });
        }
        self.takes.push_back(take_handler);
        debug_assert_queue_bounded!(self.takes.len(), MAX_QUEUE_SIZE);
        Ok(Outcome::Parked)
    }

    fn do_close(&mut self) {
        self.prune();
        if self.closed {
            return;
        }
        self.closed = true;
        if self.buf.is_some() {
            self.complete_xform_if_ready();
            self.deliver_buf_to_takers();
        }
        for taker in self.takes.drain(..) {
            handler::try_commit(taker.as_ref(), None);
        }
    }
}

/// A CSP channel carrying `In` values in, `Out` values out.
///
/// Cloning is cheap: every clone shares the same underlying queue and
/// buffer through an `Arc`, the same pattern the rest of this crate's
/// sibling components use for shared ownership.
pub struct Chan<In, Out = In> {
    inner: Arc<Mutex<ChanInner<In, Out>>>,
}

impl<In, Out> Clone for Chan<In, Out> {
    fn clone(&self) -> Self {
        Chan {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Chan<T, T> {
    /// An unbuffered (rendezvous) channel.
    pub fn unbuffered() -> Self {
        Self::from_parts(None, None, None)
    }

    /// A channel backed by `buf`, with no transducer.
    pub fn new(buf: Box<dyn Buffer<T>>) -> Self {
        Self::from_parts(Some(buf), None, None)
    }

    /// The general same-type constructor: `buf`, `xform`, and `ex_handler`
    /// are each optional, but a transducer with no buffer, or an exception
    /// handler with no transducer, is a type error.
    pub fn with_options(
        buf: Option<Box<dyn Buffer<T>>>,
        xform: Option<Xform<T, T>>,
        ex_handler: Option<ExHandler<T>>,
    ) -> ChanResult<Self> {
        if xform.is_none() && ex_handler.is_some() {
            return Err(ChanError::type_error(
                "an exception handler requires a transducer",
            ));
        }
        if xform.is_some() && buf.is_none() {
            return Err(ChanError::type_error("a transducer requires a buffer"));
        }
        Ok(Self::from_parts(buf, xform, ex_handler))
    }

    fn from_parts(
        buf: Option<Box<dyn Buffer<T>>>,
        xform: Option<Xform<T, T>>,
        ex_handler: Option<ExHandler<T>>,
    ) -> Self {
        let (sink_step, sink) = xform::collector::<T>();
        let rf: BoxStep<T> = match xform {
            Some(xf) => xf(sink_step),
            None => sink_step,
        };
        Chan {
            inner: Arc::new(Mutex::new(ChanInner {
                buf,
                takes: VecDeque::new(),
                puts: VecDeque::new(),
                closed: false,
                xform_done: false,
                rf,
                sink,
                ex_handler,
            })),
        }
    }
}

impl<In: Send + 'static, Out: Send + 'static> Chan<In, Out> {
    /// A shape-changing channel: `xform` turns `In` values into zero or
    /// more `Out` values before they land in `buf`.
    ///
    /// `xform`'s `step`/`complete` run while this channel's lock is held;
    /// a transducer that calls back into the same channel will deadlock.
    pub fn with_xform(buf: Box<dyn Buffer<Out>>, xform: Xform<In, Out>) -> Self {
        Self::from_parts_xform(buf, xform, None)
    }

    /// As [`Chan::with_xform`], plus a handler for panics escaping the
    /// transducer's `step`/`complete`.
    pub fn with_xform_and_ex_handler(
        buf: Box<dyn Buffer<Out>>,
        xform: Xform<In, Out>,
        ex_handler: ExHandler<Out>,
    ) -> Self {
        Self::from_parts_xform(buf, xform, Some(ex_handler))
    }

    fn from_parts_xform(
        buf: Box<dyn Buffer<Out>>,
        xform: Xform<In, Out>,
        ex_handler: Option<ExHandler<Out>>,
    ) -> Self {
        let (sink_step, sink) = xform::collector::<Out>();
        let rf: BoxStep<In> = xform(sink_step);
        Chan {
            inner: Arc::new(Mutex::new(ChanInner {
                buf: Some(buf),
                takes: VecDeque::new(),
                puts: VecDeque::new(),
                closed: false,
                xform_done: false,
                rf,
                sink,
                ex_handler,
            })),
        }
    }

    /// Parks (or immediately delivers) a put; resolves once the value is
    /// accepted or the channel is found closed.
    pub fn put(&self, val: In) -> ChanResult<oneshot::Receiver<bool>> {
        let (tx, rx) = oneshot::channel();
        let h: PutHandler = Box::new(FnHandler::new(
            true,
            Box::new(move |v| {
                let _ = tx.send(v);
            }),
        ));
        self.inner.lock().unwrap().do_put(h, val, true)?;
        Ok(rx)
    }

    /// Parks (or immediately delivers) a get; resolves with `Some(value)`
    /// or `None` if the channel closes before a value arrives.
    pub fn get(&self) -> ChanResult<oneshot::Receiver<Option<Out>>> {
        let (tx, rx) = oneshot::channel();
        let h: TakeHandler<Out> = Box::new(FnHandler::new(
            true,
            Box::new(move |v| {
                let _ = tx.send(v);
            }),
        ));
        self.inner.lock().unwrap().do_get(h, true)?;
        Ok(rx)
    }

    /// Non-blocking put: never parks, returns whether the value was
    /// accepted.
    pub fn offer(&self, val: In) -> ChanResult<bool> {
        let cell: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
        let cell2 = cell.clone();
        let h: PutHandler = Box::new(FnHandler::new(
            false,
            Box::new(move |v| *cell2.lock().unwrap() = Some(v)),
        ));
        self.inner.lock().unwrap().do_put(h, val, true)?;
        let result = cell
            .lock()
            .unwrap()
            .take()
            .expect("a non-blockable put always commits immediately");
        Ok(result)
    }

    /// Non-blocking get: never parks, returns `None` both when the channel
    /// is empty and when it is closed.
    pub fn poll(&self) -> ChanResult<Option<Out>> {
        let cell: Arc<Mutex<Option<Option<Out>>>> = Arc::new(Mutex::new(None));
        let cell2 = cell.clone();
        let h: TakeHandler<Out> = Box::new(FnHandler::new(
            false,
            Box::new(move |v| *cell2.lock().unwrap() = Some(v)),
        ));
        self.inner.lock().unwrap().do_get(h, true)?;
        let result = cell
            .lock()
            .unwrap()
            .take()
            .expect("a non-blockable get always commits immediately");
        Ok(result)
    }

    /// Blocking put: parks the calling thread until the value is accepted
    /// or the channel is closed.
    pub fn b_put(&self, val: In) -> ChanResult<bool> {
        let promise = Promise::new();
        let p2 = promise.clone();
        let h: PutHandler = Box::new(FnHandler::new(true, Box::new(move |v| p2.set(v))));
        self.inner.lock().unwrap().do_put(h, val, true)?;
        Ok(promise.wait())
    }

    /// Blocking get: parks the calling thread until a value arrives or the
    /// channel is closed.
    pub fn b_get(&self) -> ChanResult<Option<Out>> {
        let promise = Promise::new();
        let p2 = promise.clone();
        let h: TakeHandler<Out> = Box::new(FnHandler::new(true, Box::new(move |v| p2.set(v))));
        self.inner.lock().unwrap().do_get(h, true)?;
        Ok(promise.wait())
    }

    /// Fire-and-forget put. `cb`, if given, runs either synchronously
    /// (when the value is accepted immediately) or later, on whichever
    /// thread eventually matches this put; there is no dedicated scheduler
    /// thread to run it on.
    pub fn f_put(&self, val: In, cb: Option<Box<dyn FnOnce(bool) + Send>>) -> ChanResult<()> {
        let h: PutHandler = Box::new(FnHandler::new(
            true,
            Box::new(move |v| {
                if let Some(cb) = cb {
                    cb(v);
                }
            }),
        ));
        self.inner.lock().unwrap().do_put(h, val, true)?;
        Ok(())
    }

    /// Fire-and-forget get. `cb` runs synchronously or later, under the
    /// same rules as [`Chan::f_put`].
    pub fn f_get(&self, cb: Box<dyn FnOnce(Option<Out>) + Send>) -> ChanResult<()> {
        let h: TakeHandler<Out> = Box::new(FnHandler::new(true, cb));
        self.inner.lock().unwrap().do_get(h, true)?;
        Ok(())
    }

    /// Closes the channel. Idempotent: closing an already-closed channel
    /// is a no-op. Parked takers are immediately committed with `None`;
    /// parked putters are left untouched; a buffered transducer runs its
    /// completion arity if no putters remain parked.
    pub fn close(&self) {
        self.inner.lock().unwrap().do_close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Whether two handles refer to the same underlying channel. Used by
    /// `alt` to reject a call naming the same channel twice.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Presents an already-built handler to this channel's put protocol.
    /// `blockable` must match `put_handler.is_blockable()`; `alt` is the
    /// only caller, and always passes the non-finalizing variant so an
    /// unmatched non-blockable attempt leaves the handler uncommitted
    /// instead of resolving it to `false`.
    pub(crate) fn raw_put(&self, put_handler: PutHandler, val: In) -> ChanResult<Outcome> {
        self.inner.lock().unwrap().do_put(put_handler, val, false)
    }

    /// As [`Chan::raw_put`], for the get protocol.
    pub(crate) fn raw_get(&self, take_handler: TakeHandler<Out>) -> ChanResult<Outcome> {
        self.inner.lock().unwrap().do_get(take_handler, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::buffer;
    use crate::handler::{Flag, FlagHandler, FnHandler};

    #[test]
    fn unbuffered_rendezvous_delivers_directly() {
        let c: Chan<i32> = Chan::unbuffered();
        let rx = c.get().unwrap();
        let c2 = c.clone();
        std::thread::spawn(move || {
            c2.b_put(1).unwrap();
        });
        assert_eq!(rx.blocking_recv().unwrap(), Some(1));
    }

    #[test]
    fn buffered_put_then_get_round_trips() {
        let c: Chan<i32> = Chan::new(buffer(2).unwrap());
        assert!(c.offer(1).unwrap());
        assert!(c.offer(2).unwrap());
        assert_eq!(c.poll().unwrap(), Some(1));
        assert_eq!(c.poll().unwrap(), Some(2));
        assert_eq!(c.poll().unwrap(), None);
    }

    #[test]
    fn full_fixed_buffer_rejects_offer() {
        let c: Chan<i32> = Chan::new(buffer(1).unwrap());
        assert!(c.offer(1).unwrap());
        assert!(!c.offer(2).unwrap());
    }

    #[test]
    fn close_delivers_none_to_parked_takers() {
        let c: Chan<i32> = Chan::unbuffered();
        let rx = c.get().unwrap();
        c.close();
        assert_eq!(rx.blocking_recv().unwrap(), None);
    }

    #[test]
    fn close_drains_buffer_to_parked_takers_before_none() {
        let c: Chan<i32> = Chan::new(buffer(2).unwrap());
        c.offer(1).unwrap();
        c.close();
        assert_eq!(c.poll().unwrap(), Some(1));
        assert_eq!(c.poll().unwrap(), None);
    }

    #[test]
    fn poll_on_empty_open_channel_returns_none_without_parking() {
        let c: Chan<i32> = Chan::new(buffer(1).unwrap());
        assert_eq!(c.poll().unwrap(), None);
        assert!(!c.is_closed());
    }

    #[test]
    fn offer_after_close_is_rejected() {
        let c: Chan<i32> = Chan::new(buffer(1).unwrap());
        c.close();
        assert!(!c.offer(1).unwrap());
    }

    #[test]
    fn with_options_rejects_xform_without_buf() {
        let err = Chan::<i32>::with_options(None, Some(crate::xform::map(|v: i32| v)), None);
        assert!(err.is_err());
    }

    #[test]
    fn with_options_rejects_ex_handler_without_xform() {
        let handler: ExHandler<i32> = Arc::new(|_| None);
        let err = Chan::<i32>::with_options(None, None, Some(handler));
        assert!(err.is_err());
    }

    #[test]
    fn inactive_put_handler_does_not_discard_parked_taker() {
        let c: Chan<i32> = Chan::unbuffered();
        let received: Arc<Mutex<Option<i32>>> = Arc::new(Mutex::new(None));
        let received2 = received.clone();
        let taker: TakeHandler<i32> = Box::new(FnHandler::new(
            true,
            Box::new(move |v: Option<i32>| *received2.lock().unwrap() = v),
        ));
        assert!(matches!(c.raw_get(taker).unwrap(), Outcome::Parked));

        // A put handler that is already inactive (its flag was won by a
        // sibling elsewhere, as happens with an `alt` branch) must not
        // consume the taker it finds while scanning.
        let flag = Flag::new();
        let sibling: FlagHandler<bool> = FlagHandler::new(flag.clone(), true, Box::new(|_| {}));
        assert!(handler::try_commit(&sibling, true));
        let inactive_put: PutHandler = Box::new(FlagHandler::new(flag, true, Box::new(|_| {})));
        assert!(matches!(c.raw_put(inactive_put, 7).unwrap(), Outcome::Parked));

        // The taker parked earlier must still be there for a real put to reach.
        assert!(c.b_put(9).unwrap());
        assert_eq!(*received.lock().unwrap(), Some(9));
    }

    #[test]
    fn inactive_get_handler_does_not_discard_parked_putter() {
        let c: Chan<i32> = Chan::unbuffered();
        let put_handler: PutHandler = Box::new(FnHandler::new(true, Box::new(|_| {})));
        assert!(matches!(c.raw_put(put_handler, 5).unwrap(), Outcome::Parked));

        let flag = Flag::new();
        let sibling: FlagHandler<Option<i32>> = FlagHandler::new(flag.clone(), true, Box::new(|_| {}));
        assert!(handler::try_commit(&sibling, None));
        let inactive_take: TakeHandler<i32> = Box::new(FlagHandler::new(flag, true, Box::new(|_| {})));
        assert!(matches!(c.raw_get(inactive_take).unwrap(), Outcome::Parked));

        // The putter parked earlier must still be there for a real get to reach.
        assert_eq!(c.b_get().unwrap(), Some(5));
    }

    #[test]
    fn queue_size_exceeded_is_surfaced_synchronously() {
        let c: Chan<i32> = Chan::unbuffered();
        let mut rxs = Vec::new();
        for i in 0..MAX_QUEUE_SIZE {
            rxs.push(c.put(i as i32).unwrap());
        }
        assert!(c.put(999).is_err());
    }
}
