//! Segment (user attribute) values and their wire normalization.
//!
//! The backend only accepts string values. Numbers and booleans are sent as
//! their canonical string form and instants as Unix epoch seconds. Values of
//! any other kind are dropped before transmission, never sent.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A segment value as supplied by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentValue {
    /// Passed through unchanged.
    String(String),
    /// Canonical numeric string (`10`, `1.5`).
    Number(Number),
    /// `true` / `false`.
    Boolean(bool),
    /// Sent as epoch seconds.
    Instant(DateTime<Utc>),
    /// Anything else (null, arrays, objects). Never transmitted.
    Unsupported(Value),
}

impl SegmentValue {
    /// Wire form, or `None` for unsupported kinds.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            Self::Instant(t) => Some(t.timestamp().to_string()),
            Self::Unsupported(_) => None,
        }
    }

    /// Interpret a command-line value.
    ///
    /// `true`/`false` become booleans, numbers become numbers, RFC 3339
    /// timestamps become instants and everything else stays a string.
    pub fn parse_cli(raw: &str) -> Self {
        match raw {
            "true" => return Self::Boolean(true),
            "false" => return Self::Boolean(false),
            _ => {}
        }
        if let Ok(Value::Number(n)) = serde_json::from_str::<Value>(raw) {
            return Self::Number(n);
        }
        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Self::Instant(t.with_timezone(&Utc));
        }
        Self::String(raw.to_string())
    }
}

impl From<&str> for SegmentValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for SegmentValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for SegmentValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for SegmentValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<i64> for SegmentValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for SegmentValue {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for SegmentValue {
    fn from(n: f64) -> Self {
        // NaN and infinities have no JSON number form
        Number::from_f64(n).map_or(Self::Unsupported(Value::Null), Self::Number)
    }
}

impl From<DateTime<Utc>> for SegmentValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Instant(t)
    }
}

impl From<Value> for SegmentValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Number(n) => Self::Number(n),
            Value::Bool(b) => Self::Boolean(b),
            other => Self::Unsupported(other),
        }
    }
}

/// Caller-defined attribute name → value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentSet {
    values: BTreeMap<String, SegmentValue>,
}

impl SegmentSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SegmentValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Merge another set; later values win.
    pub fn extend(&mut self, other: SegmentSet) -> &mut Self {
        self.values.extend(other.values);
        self
    }

    /// Number of entries, including unsupported ones.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate entries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SegmentValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<Map<String, Value>> for SegmentSet {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<SegmentValue>> FromIterator<(K, V)> for SegmentSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Normalize every value to its wire string, dropping unsupported kinds.
pub fn normalize_segments(raw: &SegmentSet) -> BTreeMap<String, String> {
    raw.iter()
        .filter_map(|(name, value)| match value.to_wire() {
            Some(wire) => Some((name.to_string(), wire)),
            None => {
                log::debug!("[Segments] Dropping unsupported value for '{name}'");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_normalizes_mixed_kinds() {
        let when = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let mut raw = SegmentSet::new();
        raw.insert("count", 10)
            .insert("active", true)
            .insert("when", when)
            .insert("label", "x")
            .insert("nested", json!({"a": 1}));

        let wire = normalize_segments(&raw);

        assert_eq!(wire.len(), 4);
        assert_eq!(wire["count"], "10");
        assert_eq!(wire["active"], "true");
        assert_eq!(wire["when"], when.timestamp().to_string());
        assert_eq!(wire["when"], "1704164645");
        assert_eq!(wire["label"], "x");
        assert!(!wire.contains_key("nested"));
    }

    #[test]
    fn test_fractional_number_keeps_fraction() {
        let raw: SegmentSet = [("ratio", 1.5)].into_iter().collect();
        assert_eq!(normalize_segments(&raw)["ratio"], "1.5");
    }

    #[test]
    fn test_non_finite_number_is_dropped() {
        let raw: SegmentSet = [("bad", f64::NAN)].into_iter().collect();
        assert!(normalize_segments(&raw).is_empty());
    }

    #[test]
    fn test_pre_epoch_instant_floors() {
        let t = Utc.timestamp_millis_opt(-1500).unwrap();
        let raw: SegmentSet = [("t", t)].into_iter().collect();
        assert_eq!(normalize_segments(&raw)["t"], "-2");
    }

    #[test]
    fn test_from_json_object_drops_structures() {
        let obj = json!({
            "plan": "pro",
            "age": 30,
            "vip": false,
            "tags": ["a", "b"],
            "missing": null
        });
        let Value::Object(map) = obj else { unreachable!() };
        let wire = normalize_segments(&SegmentSet::from(map));

        assert_eq!(wire.len(), 3);
        assert_eq!(wire["plan"], "pro");
        assert_eq!(wire["age"], "30");
        assert_eq!(wire["vip"], "false");
    }

    #[test]
    fn test_extend_later_wins() {
        let mut a: SegmentSet = [("k", "old")].into_iter().collect();
        let b: SegmentSet = [("k", "new")].into_iter().collect();
        a.extend(b);
        assert_eq!(normalize_segments(&a)["k"], "new");
    }

    #[test]
    fn test_parse_cli_values() {
        assert_eq!(SegmentValue::parse_cli("true"), SegmentValue::Boolean(true));
        assert_eq!(SegmentValue::parse_cli("42"), SegmentValue::from(42));
        assert_eq!(SegmentValue::parse_cli("pro"), SegmentValue::from("pro"));
        assert_eq!(
            SegmentValue::parse_cli("2024-01-02T03:04:05Z").to_wire().as_deref(),
            Some("1704164645")
        );
    }
}
