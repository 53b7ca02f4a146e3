use std::borrow::Cow;
use std::sync::Arc;

use memoflight::{IdentityRegistry, Key, KeyArg, KeyEncoder, KeyFormat, KeySink};
use quickcheck_macros::quickcheck;

fn concatenated() -> KeyEncoder {
    KeyEncoder::new(KeyFormat::Concatenated)
}

fn prefixed() -> KeyEncoder {
    KeyEncoder::new(KeyFormat::LengthPrefixed)
}

#[test]
fn test_scalar_keys() {
    let encoder = concatenated();
    assert_eq!(encoder.encode(&()).as_str(), "");
    assert_eq!(encoder.encode(&(42u8,)).as_str(), "42");
    assert_eq!(encoder.encode(&(-7i64,)).as_str(), "-7");
    assert_eq!(encoder.encode(&(1.5f64,)).as_str(), "1.5");
    assert_eq!(encoder.encode(&(true,)).as_str(), "true");
    assert_eq!(encoder.encode(&('x',)).as_str(), "x");
    assert_eq!(encoder.encode(&("text",)).as_str(), "text");
    assert_eq!(encoder.encode(&(String::from("owned"),)).as_str(), "owned");
    assert_eq!(encoder.encode(&(Cow::Borrowed("cow"),)).as_str(), "cow");
    assert_eq!(encoder.encode(&(1, "a", 2.5, 'c', false)).as_str(), "1a2.5cfalse");
}

#[test]
fn test_concatenated_collision() {
    let encoder = concatenated();
    assert_eq!(encoder.encode(&("1", 23)), encoder.encode(&(1, "23")));
}

#[test]
fn test_length_prefixed() {
    let encoder = prefixed();
    assert_eq!(encoder.encode(&("1", 23)).as_str(), "1:12:23");
    assert_eq!(encoder.encode(&(1, "23")).as_str(), "1:12:23");
    assert_ne!(encoder.encode(&("12", 3)), encoder.encode(&("1", 23)));
    assert_eq!(encoder.encode(&("",)).as_str(), "0:");
}

#[test]
fn test_identity_tokens() {
    let encoder = concatenated();
    let first = Arc::new(String::from("same"));
    let second = Arc::new(String::from("same"));

    let a = encoder.encode(&(Arc::clone(&first),));
    let b = encoder.encode(&(Arc::clone(&second),));
    assert_eq!(a.as_str(), "#1");
    assert_eq!(b.as_str(), "#2");
    assert_eq!(encoder.encode(&(Arc::clone(&first),)), a);
    assert_eq!(encoder.encode(&(&first, 5)).as_str(), "#15");
}

#[test]
fn test_isolated_registries() {
    let object = Arc::new(7u32);
    let other = Arc::new(8u32);

    let left = concatenated();
    let right = concatenated();
    assert_eq!(left.encode(&(Arc::clone(&other),)).as_str(), "#1");
    assert_eq!(left.encode(&(Arc::clone(&object),)).as_str(), "#2");
    assert_eq!(right.encode(&(Arc::clone(&object),)).as_str(), "#1");
}

#[test]
fn test_registry_prune() {
    let registry = IdentityRegistry::new();
    let kept = Arc::new(1u8);
    assert_eq!(registry.token(&kept), 1);

    let dropped = Arc::new(2u8);
    assert_eq!(registry.token(&dropped), 2);
    drop(dropped);
    assert_eq!(registry.len(), 2);

    assert_eq!(registry.prune(), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.token(&kept), 1);
    assert_eq!(registry.token(&Arc::new(3u8)), 3);
    assert!(!registry.is_empty());
}

#[test]
fn test_custom_arg() {
    /// A point encoded by value.
    struct Point {
        x: i32,
        y: i32,
    }

    impl KeyArg for Point {
        fn encode(&self, sink: &mut KeySink) {
            sink.write_text(&format!("({},{})", self.x, self.y));
        }
    }

    let encoder = concatenated();
    assert_eq!(encoder.encode(&(Point { x: 1, y: -2 },)).as_str(), "(1,-2)");
    assert_eq!(
        encoder.encode(&(Point { x: 1, y: -2 },)),
        encoder.encode(&(Point { x: 1, y: -2 },))
    );
}

#[test]
fn test_key_conversions() {
    let key = Key::from("abc");
    assert_eq!(key, Key::from(String::from("abc")));
    assert_eq!(key.to_string(), "abc");
    assert_eq!(format!("{key:?}"), "\"abc\"");
}

#[quickcheck]
fn prop_encoding_is_deterministic(a: String, b: i64, c: char) -> bool {
    let encoder = concatenated();
    encoder.encode(&(a.clone(), b, c)) == encoder.encode(&(a, b, c))
}

#[quickcheck]
fn prop_concatenation(a: String, b: String) -> bool {
    concatenated().encode(&(a.clone(), b.clone())).as_str() == format!("{a}{b}")
}

#[quickcheck]
fn prop_length_prefixed_is_injective(a: (String, String), b: (String, String)) -> bool {
    let encoder = prefixed();
    (encoder.encode(&a) == encoder.encode(&b)) == (a == b)
}

#[quickcheck]
fn prop_distinct_integers(a: u64, b: u64) -> bool {
    let encoder = concatenated();
    (encoder.encode(&(a,)) == encoder.encode(&(b,))) == (a == b)
}
