//! chanflow - CSP-style channels for coordinating threads
//!
//! A Rust take on Clojure's `core.async`/Python's `chanpy`: rendezvous and
//! buffered channels, a committed-choice `alt` across heterogeneous
//! operations, and a transducer protocol for embedding value transforms
//! directly in a channel's buffer.
//!
//! # Example
//!
//! ```
//! use chanflow::{buffer, Chan};
//!
//! let c: Chan<i32> = Chan::new(buffer(4).unwrap());
//! c.offer(1).unwrap();
//! c.offer(2).unwrap();
//! assert_eq!(c.poll().unwrap(), Some(1));
//! c.close();
//! ```
//!
//! # Concurrency model
//!
//! There is no dedicated scheduler thread. A parked `put`/`get`/`alt`
//! branch resolves on whichever thread happens to perform the matching
//! operation; `f_put`/`f_get` callbacks and `put`/`get`'s `oneshot`
//! futures are driven the same way.

mod alt;
mod buffer;
mod channel;
mod error;
mod handler;
mod invariants;
mod ops;
mod promise;
mod xform;

pub use alt::{alt, b_alt, AltOp, AltOutcome};
pub use buffer::{buffer, dropping_buffer, promise_buffer, sliding_buffer, Buffer};
pub use channel::{Chan, ExHandler, MAX_QUEUE_SIZE};
pub use error::{ChanError, ChanResult};
pub use ops::{onto_chan, timeout, to_vec};
pub use xform::{
    cat, comp, dedupe, distinct, drop, drop_last, drop_while, interpose, keep, keep_indexed, map,
    map_indexed, mapcat, partition, partition_all, partition_by, random_sample, reductions,
    remove, remove_indexed, replace, take, take_last, take_nth, take_while, BoxStep, Reduced,
    Step, Xform,
};
