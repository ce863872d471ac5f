//! The error taxonomy shared by every public entry point.

use thiserror::Error;

/// The four error categories a channel operation can raise.
///
/// Parked operations never observe these: a `put`/`get` that parks returns a
/// future instead, and the future only ever resolves with the op's own
/// result type, never an error. Errors are reserved for misuse caught
/// synchronously at the call boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChanError {
    /// A null value was supplied where one is disallowed, or the
    /// transducer produced one, or the constructor combination is invalid
    /// (`xform` without `buf`, or `ex_handler` without `xform`).
    #[error("type error: {0}")]
    TypeError(String),

    /// A non-positive buffer capacity, a duplicate channel across `alt`'s
    /// operations, an empty `alt` call, or a non-positive `n` passed to a
    /// transducer constructor.
    #[error("value error: {0}")]
    ValueError(String),

    /// A channel's parked-operation queue would exceed `MAX_QUEUE_SIZE`.
    #[error("queue size exceeded: more than {max} operations parked")]
    QueueSizeExceeded { max: usize },

    /// A panic escaped the user's transducer and the `ex_handler` either
    /// re-raised it or none was supplied.
    #[error("user exception escaped transducer: {0}")]
    UserException(String),
}

impl ChanError {
    pub(crate) fn type_error(msg: impl Into<String>) -> Self {
        ChanError::TypeError(msg.into())
    }

    pub(crate) fn value_error(msg: impl Into<String>) -> Self {
        ChanError::ValueError(msg.into())
    }
}

pub type ChanResult<T> = Result<T, ChanError>;
