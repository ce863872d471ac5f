//! Convenience operators built only from `Chan`'s public surface.
//!
//! Grounded in `chanpy`'s `t.onto_chan`/`t.to_list` helpers. None of these
//! take part in the channel's own locking discipline; they are ordinary
//! callers of `b_put`/`b_get`/`close`, just like any other consumer of the
//! crate would be.

use std::time::Duration;

use crate::channel::Chan;
use crate::error::ChanResult;

/// Blocking-puts every item of `iter` onto `ch`, then closes it unless
/// `close` is `false`. Stops early, leaving `ch` open, if a put is rejected
/// because `ch` was already closed by someone else.
pub fn onto_chan<T, I>(ch: &Chan<T>, iter: I, close: bool) -> ChanResult<()>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
{
    for item in iter {
        if !ch.b_put(item)? {
            return Ok(());
        }
    }
    if close {
        ch.close();
    }
    Ok(())
}

/// Blocking-drains `ch` into a `Vec`, stopping once it closes.
pub fn to_vec<T: Send + 'static>(ch: &Chan<T>) -> ChanResult<Vec<T>> {
    let mut out = Vec::new();
    while let Some(v) = ch.b_get()? {
        out.push(v);
    }
    Ok(out)
}

/// A channel that closes itself after `d` elapses, for use as one arm of an
/// `alt`. The spawned thread is the only timekeeping this crate does; the
/// core itself never looks at a clock.
pub fn timeout(d: Duration) -> Chan<()> {
    let ch: Chan<()> = Chan::unbuffered();
    let ch2 = ch.clone();
    std::thread::spawn(move || {
        std::thread::sleep(d);
        ch2.close();
    });
    ch
}
