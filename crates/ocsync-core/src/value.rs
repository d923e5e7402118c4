//! Schema-less JSON values.
//!
//! The server emits free-form JSON for tool input, tool metadata and a few
//! other payloads. [`DynamicValue`] holds those trees without a schema and
//! writes them back out unchanged in value.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::DecodeError;

/// String-keyed map of dynamic values. Keys are kept sorted, so equality
/// ignores the order keys arrived in.
pub type ValueMap = BTreeMap<String, DynamicValue>;

/// Keys consulted, in order, when rendering a map for display.
const DISPLAY_KEYS: [&str; 5] = ["path", "pattern", "command", "query", "description"];

/// A JSON value decoded without a fixed schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<DynamicValue>),
    Map(ValueMap),
    #[default]
    Null,
}

impl DynamicValue {
    /// Decode a value from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the value as JSON bytes. Non-finite floats become `null`.
    pub fn encode(&self) -> Vec<u8> {
        self.canonical_json().into_bytes()
    }

    /// Render as compact JSON with map keys in sorted order.
    pub fn canonical_json(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }

    /// Human-readable rendering used when summarising tool input.
    ///
    /// Scalars are stringified directly. For maps the first string value
    /// found under `path`, `pattern`, `command`, `query` or `description`
    /// wins, in that order; otherwise the map renders as canonical JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            DynamicValue::String(s) => s.clone(),
            DynamicValue::Int(i) => i.to_string(),
            DynamicValue::Float(f) => format!("{:?}", f),
            DynamicValue::Bool(b) => b.to_string(),
            DynamicValue::Null => "null".to_string(),
            DynamicValue::List(_) => self.canonical_json(),
            DynamicValue::Map(map) => DISPLAY_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(DynamicValue::as_str))
                .map(str::to_owned)
                .unwrap_or_else(|| self.canonical_json()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynamicValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Int(i) => Some(*i as f64),
            DynamicValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            DynamicValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }
}

impl fmt::Display for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::Bool(b) => serializer.serialize_bool(*b),
            DynamicValue::Int(i) => serializer.serialize_i64(*i),
            DynamicValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            DynamicValue::Float(_) | DynamicValue::Null => serializer.serialize_unit(),
            DynamicValue::String(s) => serializer.serialize_str(s),
            DynamicValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DynamicValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct DynamicValueVisitor;

impl<'de> Visitor<'de> for DynamicValueVisitor {
    type Value = DynamicValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Int(v))
    }

    // Integers that overflow i64 fall through to the float interpretation.
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DynamicValue, E> {
        Ok(i64::try_from(v)
            .map(DynamicValue::Int)
            .unwrap_or(DynamicValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<DynamicValue, D::Error> {
        DynamicValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DynamicValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DynamicValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DynamicValue, A::Error> {
        let mut map = ValueMap::new();
        while let Some((key, value)) = access.next_entry::<String, DynamicValue>()? {
            map.insert(key, value);
        }
        Ok(DynamicValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DynamicValueVisitor)
    }
}

impl From<serde_json::Value> for DynamicValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => DynamicValue::Null,
            serde_json::Value::Bool(b) => DynamicValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DynamicValue::Int(i),
                None => n.as_f64().map(DynamicValue::Float).unwrap_or_default(),
            },
            serde_json::Value::String(s) => DynamicValue::String(s),
            serde_json::Value::Array(items) => {
                DynamicValue::List(items.into_iter().map(DynamicValue::from).collect())
            }
            serde_json::Value::Object(map) => DynamicValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, DynamicValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<DynamicValue> for serde_json::Value {
    fn from(value: DynamicValue) -> Self {
        match value {
            DynamicValue::Null => serde_json::Value::Null,
            DynamicValue::Bool(b) => serde_json::Value::Bool(b),
            DynamicValue::Int(i) => serde_json::Value::from(i),
            DynamicValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DynamicValue::String(s) => serde_json::Value::String(s),
            DynamicValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            DynamicValue::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

impl From<bool> for DynamicValue {
    fn from(v: bool) -> Self {
        DynamicValue::Bool(v)
    }
}

impl From<i64> for DynamicValue {
    fn from(v: i64) -> Self {
        DynamicValue::Int(v)
    }
}

impl From<f64> for DynamicValue {
    fn from(v: f64) -> Self {
        DynamicValue::Float(v)
    }
}

impl From<&str> for DynamicValue {
    fn from(v: &str) -> Self {
        DynamicValue::String(v.to_owned())
    }
}

impl From<String> for DynamicValue {
    fn from(v: String) -> Self {
        DynamicValue::String(v)
    }
}

impl From<Vec<DynamicValue>> for DynamicValue {
    fn from(v: Vec<DynamicValue>) -> Self {
        DynamicValue::List(v)
    }
}

impl From<ValueMap> for DynamicValue {
    fn from(v: ValueMap) -> Self {
        DynamicValue::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, DynamicValue)]) -> DynamicValue {
        DynamicValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_decode_scalars_in_order() {
        assert_eq!(DynamicValue::decode(b"true").unwrap(), DynamicValue::Bool(true));
        assert_eq!(DynamicValue::decode(b"42").unwrap(), DynamicValue::Int(42));
        assert_eq!(DynamicValue::decode(b"-7").unwrap(), DynamicValue::Int(-7));
        assert_eq!(DynamicValue::decode(b"42.5").unwrap(), DynamicValue::Float(42.5));
        assert_eq!(
            DynamicValue::decode(b"\"42\"").unwrap(),
            DynamicValue::String("42".to_string())
        );
        assert_eq!(DynamicValue::decode(b"null").unwrap(), DynamicValue::Null);
    }

    #[test]
    fn test_large_unsigned_falls_through_to_float() {
        let value = DynamicValue::decode(b"18446744073709551615").unwrap();
        assert!(matches!(value, DynamicValue::Float(_)));
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(DynamicValue::decode(b"{not json").is_err());
    }

    #[test]
    fn test_map_equality_ignores_key_order() {
        let a = DynamicValue::decode(br#"{"a":1,"b":[true,null]}"#).unwrap();
        let b = DynamicValue::decode(br#"{"b":[true,null],"a":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_nested_value_survives_encode_decode() {
        let value = map(&[
            ("flag", DynamicValue::Bool(false)),
            ("count", DynamicValue::Int(3)),
            ("ratio", DynamicValue::Float(0.25)),
            ("whole", DynamicValue::Float(2.0)),
            ("name", "grep".into()),
            ("none", DynamicValue::Null),
            (
                "items",
                DynamicValue::List(vec![DynamicValue::Int(1), map(&[("x", "y".into())])]),
            ),
        ]);
        let decoded = DynamicValue::decode(&value.encode()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_non_finite_float_encodes_as_null() {
        assert_eq!(DynamicValue::Float(f64::NAN).encode(), b"null".to_vec());
        let list = DynamicValue::List(vec![DynamicValue::Float(f64::INFINITY)]);
        assert_eq!(list.canonical_json(), "[null]");
    }

    #[test]
    fn test_display_scalars() {
        assert_eq!(DynamicValue::from("ls -la").to_display_string(), "ls -la");
        assert_eq!(DynamicValue::Int(12).to_display_string(), "12");
        assert_eq!(DynamicValue::Float(3.0).to_display_string(), "3.0");
        assert_eq!(DynamicValue::Float(1.5).to_display_string(), "1.5");
        assert_eq!(DynamicValue::Bool(true).to_display_string(), "true");
        assert_eq!(DynamicValue::Null.to_display_string(), "null");
    }

    #[test]
    fn test_display_map_key_priority() {
        let value = map(&[
            ("description", "list files".into()),
            ("command", "ls".into()),
            ("path", "/tmp".into()),
        ]);
        assert_eq!(value.to_display_string(), "/tmp");

        let value = map(&[("description", "list files".into()), ("command", "ls".into())]);
        assert_eq!(value.to_display_string(), "ls");

        let value = map(&[("query", "rust".into()), ("description", "search".into())]);
        assert_eq!(value.to_display_string(), "rust");
    }

    #[test]
    fn test_display_map_skips_non_string_keys() {
        let value = map(&[("path", DynamicValue::Int(4)), ("pattern", "*.rs".into())]);
        assert_eq!(value.to_display_string(), "*.rs");
    }

    #[test]
    fn test_display_map_falls_back_to_sorted_json() {
        let value = DynamicValue::decode(br#"{"zeta":1,"alpha":"b"}"#).unwrap();
        assert_eq!(value.to_display_string(), r#"{"alpha":"b","zeta":1}"#);
    }

    #[test]
    fn test_serde_json_value_conversion() {
        let json = serde_json::json!({"a": [1, 2.5, "s", null, {"b": false}]});
        let value = DynamicValue::from(json.clone());
        assert_eq!(serde_json::Value::from(value), json);
    }
}
