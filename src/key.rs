use std::any::Any;
use std::borrow::{Borrow, Cow};
use std::fmt::{self, Debug, Display, Formatter, Write};
use std::sync::Arc;

use crate::identity::IdentityRegistry;

/// A cache key derived from an argument tuple.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Arc<str>);

impl Key {
    /// The key's text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Self(text.into())
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Self(text.into())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

/// How the parts of an argument tuple are joined into a key.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KeyFormat {
    /// Parts are concatenated without a separator.
    ///
    /// Tuples whose parts stringify to the same concatenation collide:
    /// `("1", 23)` and `(1, "23")` both produce the key `123`. Callers that
    /// need to tell them apart must encode a separator into their arguments
    /// or use [`KeyFormat::LengthPrefixed`].
    #[default]
    Concatenated,
    /// Every part is written as `<len>:<text>`, where `len` is the part's
    /// length in bytes.
    LengthPrefixed,
}

/// Maps argument tuples to cache keys.
///
/// Cloning an encoder shares its identity registry, so clones produce the
/// same tokens for the same objects.
#[derive(Clone, Default)]
pub struct KeyEncoder {
    format: KeyFormat,
    registry: Arc<IdentityRegistry>,
}

impl KeyEncoder {
    /// Create an encoder with its own identity registry.
    pub fn new(format: KeyFormat) -> Self {
        Self::with_registry(format, Arc::new(IdentityRegistry::new()))
    }

    /// Create an encoder that allocates tokens from the given registry.
    pub fn with_registry(format: KeyFormat, registry: Arc<IdentityRegistry>) -> Self {
        Self { format, registry }
    }

    /// The encoder's key format.
    pub fn format(&self) -> KeyFormat {
        self.format
    }

    /// The encoder's identity registry.
    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    /// Encode an argument tuple.
    pub fn encode<A: KeyArgs + ?Sized>(&self, args: &A) -> Key {
        let mut sink = KeySink { text: String::new(), encoder: self };
        args.encode_all(&mut sink);
        Key::from(sink.text)
    }
}

impl Debug for KeyEncoder {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("KeyEncoder")
            .field("format", &self.format)
            .field("registered", &self.registry.len())
            .finish()
    }
}

/// Receives the textual contributions of arguments while a key is built.
pub struct KeySink<'a> {
    text: String,
    encoder: &'a KeyEncoder,
}

impl KeySink<'_> {
    /// Contribute a part by value.
    pub fn write_text(&mut self, part: &str) {
        if self.encoder.format == KeyFormat::LengthPrefixed {
            let _ = write!(self.text, "{}:", part.len());
        }
        self.text.push_str(part);
    }

    /// Contribute a part by its `Display` representation.
    pub fn write_display<T: Display + ?Sized>(&mut self, part: &T) {
        match self.encoder.format {
            KeyFormat::Concatenated => {
                let _ = write!(self.text, "{part}");
            }
            KeyFormat::LengthPrefixed => self.write_text(&part.to_string()),
        }
    }

    /// Contribute a part by the identity of a shared object.
    ///
    /// The part is rendered as `#<token>`.
    pub fn write_identity<T>(&mut self, object: &Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let token = self.encoder.registry.token(object);
        self.write_text(&format!("#{token}"));
    }
}

/// A single argument that can take part in a cache key.
///
/// Scalars and text contribute their canonical text, so equal values always
/// produce equal keys. Shared objects (`Arc<T>`) contribute their identity
/// instead of their contents.
pub trait KeyArg {
    /// Write this argument's contribution into the sink.
    fn encode(&self, sink: &mut KeySink);
}

macro_rules! display_args {
    ($($ty:ty),* $(,)?) => {
        $(impl KeyArg for $ty {
            #[inline]
            fn encode(&self, sink: &mut KeySink) {
                sink.write_display(self);
            }
        })*
    };
}

display_args! {
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64, bool, char,
}

impl KeyArg for str {
    #[inline]
    fn encode(&self, sink: &mut KeySink) {
        sink.write_text(self);
    }
}

impl KeyArg for String {
    #[inline]
    fn encode(&self, sink: &mut KeySink) {
        sink.write_text(self);
    }
}

impl KeyArg for Cow<'_, str> {
    #[inline]
    fn encode(&self, sink: &mut KeySink) {
        sink.write_text(self);
    }
}

impl<T: KeyArg + ?Sized> KeyArg for &T {
    #[inline]
    fn encode(&self, sink: &mut KeySink) {
        (**self).encode(sink);
    }
}

impl<T: Any + Send + Sync> KeyArg for Arc<T> {
    #[inline]
    fn encode(&self, sink: &mut KeySink) {
        sink.write_identity(self);
    }
}

/// An argument tuple of fixed arity.
pub trait KeyArgs {
    /// Write the contributions of all arguments, in order.
    fn encode_all(&self, sink: &mut KeySink);
}

macro_rules! tuple_args {
    ($($param:ident),*) => {
        impl<$($param: KeyArg),*> KeyArgs for ($($param,)*) {
            #[inline]
            #[allow(non_snake_case, unused_variables)]
            fn encode_all(&self, sink: &mut KeySink) {
                let ($($param,)*) = self;
                $($param.encode(sink);)*
            }
        }
    };
}

tuple_args! {}
tuple_args! { A }
tuple_args! { A, B }
tuple_args! { A, B, C }
tuple_args! { A, B, C, D }
tuple_args! { A, B, C, D, E }
tuple_args! { A, B, C, D, E, F }
tuple_args! { A, B, C, D, E, F, G }
tuple_args! { A, B, C, D, E, F, G, H }
