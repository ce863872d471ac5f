//! `alt`: atomic committed choice among heterogeneous put/get operations.
//!
//! Grounded on `chanpy.channel.alts`'s scan-and-park loop, restated for a
//! `Vec<AltOp<T>>` built from this crate's own `Handler`/`Chan` types. Every
//! operation passed to one call shares a value type `T`; see the module
//! docs on [`AltOp`] for why.

use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use tokio::sync::oneshot;

use crate::channel::{Chan, Outcome, PutHandler, TakeHandler};
use crate::error::{ChanError, ChanResult};
use crate::handler::{Flag, FlagHandler};
use crate::promise::Promise;

/// One candidate operation passed to [`alt`]: either a get from `Chan<T>`,
/// or a put of a `T` value onto it.
///
/// A strongly typed `alt` cannot range over channels of unrelated value
/// types in one call the way the dynamically typed reference implementation
/// does; every op here shares one `T`. A caller that needs to select among
/// heterogeneous channels wraps their payloads in a common enum first.
pub enum AltOp<T> {
    Get(Chan<T>),
    Put(Chan<T>, T),
}

/// The result of a committed [`alt`] call.
pub enum AltOutcome<T> {
    /// A get op won: the value (`None` if the channel was closed) and the
    /// channel it came from.
    Got(Option<T>, Chan<T>),
    /// A put op won: whether it was accepted, and the channel it targeted.
    Put(bool, Chan<T>),
    /// No op matched immediately and a `default` was supplied.
    Default(T),
}

fn validate<T: Send + 'static>(ops: &[AltOp<T>]) -> ChanResult<()> {
    if ops.is_empty() {
        return Err(ChanError::value_error("alt requires at least one operation"));
    }
    for (i, a) in ops.iter().enumerate() {
        for b in &ops[i + 1..] {
            if chan_of(a).ptr_eq(chan_of(b)) {
                return Err(ChanError::value_error(
                    "alt was given the same channel more than once",
                ));
            }
        }
    }
    Ok(())
}

fn chan_of<T>(op: &AltOp<T>) -> &Chan<T> {
    match op {
        AltOp::Get(c) | AltOp::Put(c, _) => c,
    }
}

/// Atomically commits at most one of `ops`. `priority`, when `true`, tries
/// the operations in the order given; otherwise tries them in a random
/// order each call, per `core.async`'s fairness intent. `default`, when
/// given, makes every op non-blocking: if none matches immediately, `alt`
/// resolves to `AltOutcome::Default` instead of parking.
///
/// Returns a future (backed by a `oneshot`) that resolves once an op
/// commits. With no `default`, that may be immediately or arbitrarily
/// later, on whichever thread performs the matching operation.
pub fn alt<T: Send + 'static>(
    mut ops: Vec<AltOp<T>>,
    priority: bool,
    default: Option<T>,
) -> ChanResult<oneshot::Receiver<AltOutcome<T>>> {
    validate(&ops)?;
    if !priority {
        ops.shuffle(&mut rand::thread_rng());
    }

    let flag = Flag::new();
    let blockable = default.is_none();
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    for op in ops {
        let committed = try_one(op, &flag, blockable, &tx)?;
        if committed {
            return Ok(rx);
        }
    }

    if let Some(default_val) = default {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(AltOutcome::Default(default_val));
        }
    }
    Ok(rx)
}

fn try_one<T: Send + 'static>(
    op: AltOp<T>,
    flag: &Arc<Flag>,
    blockable: bool,
    tx: &Arc<Mutex<Option<oneshot::Sender<AltOutcome<T>>>>>,
) -> ChanResult<bool> {
    match op {
        AltOp::Get(chan) => {
            let chan_for_cb = chan.clone();
            let tx2 = tx.clone();
            let handler: TakeHandler<T> = Box::new(FlagHandler::new(
                flag.clone(),
                blockable,
                Box::new(move |v| {
                    if let Some(tx) = tx2.lock().unwrap().take() {
                        let _ = tx.send(AltOutcome::Got(v, chan_for_cb));
                    }
                }),
            ));
            Ok(matches!(chan.raw_get(handler)?, Outcome::Committed))
        }
        AltOp::Put(chan, val) => {
            let chan_for_cb = chan.clone();
            let tx2 = tx.clone();
            let handler: PutHandler = Box::new(FlagHandler::new(
                flag.clone(),
                blockable,
                Box::new(move |v| {
                    if let Some(tx) = tx2.lock().unwrap().take() {
                        let _ = tx.send(AltOutcome::Put(v, chan_for_cb));
                    }
                }),
            ));
            Ok(matches!(chan.raw_put(handler, val)?, Outcome::Committed))
        }
    }
}

/// Blocking variant of [`alt`]: parks the calling thread until an op
/// commits (or, with a `default`, returns immediately).
pub fn b_alt<T: Send + 'static>(
    mut ops: Vec<AltOp<T>>,
    priority: bool,
    default: Option<T>,
) -> ChanResult<AltOutcome<T>> {
    validate(&ops)?;
    if !priority {
        ops.shuffle(&mut rand::thread_rng());
    }

    let flag = Flag::new();
    let blockable = default.is_none();
    let promise: Arc<Promise<AltOutcome<T>>> = Promise::new();
    let delivered = Arc::new(Mutex::new(false));

    for op in ops {
        let committed = try_one_blocking(op, &flag, blockable, &promise, &delivered)?;
        if committed {
            return Ok(promise.wait());
        }
    }

    if let Some(default_val) = default {
        return Ok(AltOutcome::Default(default_val));
    }
    Ok(promise.wait())
}

fn try_one_blocking<T: Send + 'static>(
    op: AltOp<T>,
    flag: &Arc<Flag>,
    blockable: bool,
    promise: &Arc<Promise<AltOutcome<T>>>,
    delivered: &Arc<Mutex<bool>>,
) -> ChanResult<bool> {
    match op {
        AltOp::Get(chan) => {
            let chan_for_cb = chan.clone();
            let promise2 = promise.clone();
            let delivered2 = delivered.clone();
            let handler: TakeHandler<T> = Box::new(FlagHandler::new(
                flag.clone(),
                blockable,
                Box::new(move |v| {
                    let mut d = delivered2.lock().unwrap();
                    if !*d {
                        *d = true;
                        promise2.set(AltOutcome::Got(v, chan_for_cb));
                    }
                }),
            ));
            Ok(matches!(chan.raw_get(handler)?, Outcome::Committed))
        }
        AltOp::Put(chan, val) => {
            let chan_for_cb = chan.clone();
            let promise2 = promise.clone();
            let delivered2 = delivered.clone();
            let handler: PutHandler = Box::new(FlagHandler::new(
                flag.clone(),
                blockable,
                Box::new(move |v| {
                    let mut d = delivered2.lock().unwrap();
                    if !*d {
                        *d = true;
                        promise2.set(AltOutcome::Put(v, chan_for_cb));
                    }
                }),
            ));
            Ok(matches!(chan.raw_put(handler, val)?, Outcome::Committed))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::buffer;

    #[test]
    fn empty_ops_is_a_value_error() {
        let result: ChanResult<oneshot::Receiver<AltOutcome<i32>>> = alt(Vec::new(), false, None);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_channel_is_a_value_error() {
        let c: Chan<i32> = Chan::unbuffered();
        let result = alt(vec![AltOp::Get(c.clone()), AltOp::Get(c)], false, None);
        assert!(result.is_err());
    }

    #[test]
    fn default_returned_when_nothing_ready() {
        let c: Chan<i32> = Chan::new(buffer(1).unwrap());
        let outcome = b_alt(vec![AltOp::Get(c)], false, Some(99)).unwrap();
        assert!(matches!(outcome, AltOutcome::Default(99)));
    }

    #[test]
    fn buffered_value_wins_over_default() {
        let c: Chan<i32> = Chan::new(buffer(1).unwrap());
        c.offer(7).unwrap();
        let outcome = b_alt(vec![AltOp::Get(c)], false, Some(99)).unwrap();
        match outcome {
            AltOutcome::Got(Some(7), _) => {}
            _ => panic!("expected the buffered value to win"),
        }
    }

    #[test]
    fn priority_tries_first_ready_op_in_order() {
        let empty: Chan<i32> = Chan::new(buffer(1).unwrap());
        let ready: Chan<i32> = Chan::new(buffer(1).unwrap());
        ready.offer(5).unwrap();
        let outcome = b_alt(
            vec![AltOp::Get(empty), AltOp::Get(ready)],
            true,
            Some(-1),
        )
        .unwrap();
        match outcome {
            AltOutcome::Got(Some(5), _) => {}
            _ => panic!("expected the second (ready) op to win"),
        }
    }

    #[test]
    fn rendezvous_between_two_alts() {
        let c: Chan<bool> = Chan::unbuffered();
        let c2 = c.clone();
        let putter = std::thread::spawn(move || b_alt(vec![AltOp::Put(c2, true)], false, None));
        let outcome = b_alt(vec![AltOp::Get(c)], false, None).unwrap();
        assert!(matches!(outcome, AltOutcome::Got(Some(true), _)));
        assert!(matches!(putter.join().unwrap().unwrap(), AltOutcome::Put(true, _)));
    }
}
