extern crate proc_macro;

macro_rules! bail {
    ($item:expr, $fmt:literal $($tts:tt)*) => {
        return Err(Error::new_spanned(
            &$item,
            format!(concat!("memoflight: ", $fmt) $($tts)*)
        ))
    }
}

mod memoize;
mod utils;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_quote, Error, Result};

/// Memoize a pure function.
///
/// Calls with equal arguments execute the function only once, even when
/// they happen concurrently on many threads. Arguments must be owned and
/// implement `KeyArg`; the return type must be `Clone + Send + Sync`.
///
/// ```ignore
/// #[memoize]
/// fn describe(width: u32, height: u32) -> String {
///     format!("The image is {width}x{height} pixels.")
/// }
/// ```
///
/// The memoizer can be given a name and an eviction policy:
///
/// ```ignore
/// #[memoize(name = "render", policy = EvictionPolicy::Sliding(Duration::from_secs(60)))]
/// fn render(path: String) -> Vec<u8> {
///     std::fs::read(path).unwrap_or_default()
/// }
/// ```
#[proc_macro_attribute]
pub fn memoize(args: TokenStream, stream: TokenStream) -> TokenStream {
    let meta = syn::parse_macro_input!(args as memoize::Meta);
    let func = syn::parse_macro_input!(stream as syn::ItemFn);
    memoize::expand(meta, func)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
