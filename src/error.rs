use std::any::Any;

use thiserror::Error;

/// A failure observed by a caller of a memoized function.
///
/// Failures of the wrapped computation itself are part of its output (a
/// function returning `Result<T, E>` caches and returns its `Err` like any
/// other value) and are not represented here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoError {
    /// The memoizer was disposed before the call.
    #[error("memoflight: memoized function `{function}` was used after dispose")]
    Disposed {
        /// The name of the memoized function.
        function: String,
    },
    /// The wrapped function panicked while computing the entry.
    ///
    /// The panic is captured by the initiating caller and delivered to every
    /// waiter. The entry stays cached until it is cleared.
    #[error("memoflight: memoized function `{function}` panicked: {message}")]
    Panicked {
        /// The name of the memoized function.
        function: String,
        /// The panic payload, rendered as text.
        message: String,
    },
}

/// An invalid memoizer configuration, reported when the memoizer is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A time-to-live policy with a zero duration.
    #[error("memoflight: time-to-live must be longer than zero")]
    ZeroTimeToLive,
    /// A sliding expiration policy with a zero window.
    #[error("memoflight: sliding expiration window must be longer than zero")]
    ZeroSlidingWindow,
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
