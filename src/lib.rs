//! Concurrent memoization.
//!
//! A [`Memoizer`] wraps a function and guarantees that, for every distinct
//! argument tuple, the function runs at most once, no matter how many
//! threads call it at the same time. All callers observe the same output.
//!
//! ```
//! use memoflight::Memoizer;
//!
//! let square = Memoizer::new(|(x,): (u64,)| x * x);
//! assert_eq!(square.invoke((12,)), Ok(144));
//! assert_eq!(square.invoke((12,)), Ok(144));
//! assert_eq!(square.misses(), 1);
//! assert_eq!(square.invocations(), 2);
//! ```

mod deferred;
mod error;
mod hash;
mod identity;
mod key;
mod memoize;
mod store;
#[cfg(feature = "testing")]
mod testing;

pub use crate::deferred::Deferred;
pub use crate::error::{ConfigError, MemoError};
pub use crate::identity::IdentityRegistry;
pub use crate::key::{Key, KeyArg, KeyArgs, KeyEncoder, KeyFormat, KeySink};
pub use crate::memoize::{Builder, DefaultStore, Memoizer, Stats};
pub use crate::store::{EvictionPolicy, Expiry, Inserted, MapStore, Store};
#[cfg(feature = "macros")]
pub use memoflight_macros::memoize;

/// These are implementation details. Do not rely on them!
#[doc(hidden)]
pub mod internal {
    use crate::{EvictionPolicy, KeyArgs, Memoizer};

    #[cfg(feature = "testing")]
    pub use crate::testing::last_was_hit;

    /// Create the memoizer behind a `#[memoize]` function.
    pub fn memoizer<A, Out, F>(name: &'static str, policy: EvictionPolicy, func: F) -> Memoizer<A, Out>
    where
        A: KeyArgs,
        Out: Clone + Send + Sync,
        F: Fn(A) -> Out + Send + Sync + 'static,
    {
        match Memoizer::builder().name(name).policy(policy).build(func) {
            Ok(memoizer) => memoizer,
            Err(err) => panic!("{err} (in memoized function `{name}`)"),
        }
    }

    /// Call the memoizer behind a `#[memoize]` function.
    pub fn invoke<A, Out>(memoizer: &Memoizer<A, Out>, args: A) -> Out
    where
        A: KeyArgs,
        Out: Clone + Send + Sync,
    {
        match memoizer.invoke(args) {
            Ok(output) => output,
            Err(err) => panic!("{err}"),
        }
    }
}
