use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::core::tag::Tag;

/// Insertion-ordered mapping used for decoded objects.
///
/// Fields appear in document order on read; on write the order is irrelevant
/// because the template decides emission order.
pub type Map = IndexMap<String, Value>;

/// A node of the decoded value tree.
///
/// This is what a read produces and what a write consumes. Besides the plain
/// JSON-like shapes it can hold a [`Tag`] captured verbatim from the source.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
    Tag(Tag),
}

impl Value {
    /// Returns the field `key` when this is a mapping.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Map(map) => map.get_mut(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Value::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Tag(_) => "tag",
        }
    }

    /// Builds a mapping from key/value pairs, keeping their order.
    pub fn map<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// An empty mapping, the result of a document where nothing matched.
    pub fn empty_map() -> Value {
        Value::Map(Map::new())
    }
}

/// Largest magnitude below which every integer is exact in an `f64`.
const MAX_SAFE_INTEGER: f64 = 9.007_199_254_740_992e15;

/// Renders a number the way it appears in element text.
///
/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < MAX_SAFE_INTEGER {
        format!("{}", n as i64)
    } else if n == n.trunc() {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Permissive numeric decoding of element text.
///
/// Surrounding whitespace is ignored, empty text is `0`, hexadecimal
/// literals are accepted and anything else that does not parse is `NaN`.
pub fn coerce_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    // Rust accepts spellings like "inf" and "nan" that element text should not.
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E' | 'x' | 'X'))
        && !is_hex_literal(trimmed)
    {
        return f64::NAN;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn is_hex_literal(text: &str) -> bool {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Tag> for Value {
    fn from(tag: Tag) -> Self {
        Value::Tag(tag)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Tag(tag) => tag.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_format_like_element_text() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn large_whole_numbers_keep_their_digits() {
        assert_eq!(format_number(9_007_199_254_740_991.0), "9007199254740991");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(-1e19), "-10000000000000000000");
        assert_eq!(format_number(1e21), "1000000000000000000000");
        assert_eq!(coerce_number(&format_number(1e20)), 1e20);
    }

    #[test]
    fn numeric_coercion_is_permissive() {
        assert_eq!(coerce_number("12"), 12.0);
        assert_eq!(coerce_number("  7.25\n"), 7.25);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("   "), 0.0);
        assert_eq!(coerce_number("0x1F"), 31.0);
        assert_eq!(coerce_number("1e3"), 1000.0);
        assert_eq!(coerce_number("Infinity"), f64::INFINITY);
        assert!(coerce_number("abc").is_nan());
        assert!(coerce_number("12abc").is_nan());
        assert!(coerce_number("inf").is_nan());
        assert!(coerce_number("nan").is_nan());
    }

    #[test]
    fn map_helper_keeps_insertion_order() {
        let value = Value::map([("b", Value::from(1)), ("a", Value::from("x"))]);
        let keys: Vec<&String> = value.as_map().unwrap().keys().collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(value.get("a").and_then(Value::as_str), Some("x"));
        assert_eq!(value.get("b").and_then(Value::as_f64), Some(1.0));
        assert!(value.get("c").is_none());
    }

    #[test]
    fn option_maps_to_null() {
        assert!(Value::from(None::<String>).is_null());
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}
