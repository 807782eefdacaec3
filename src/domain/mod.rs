//! Data shapes shared across layers: batch envelopes, records, issues and lookup types.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::common::constants::{DEFAULT_COUNTRY, MIN_POSTAL_DIGITS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Customer,
    Product,
    Supplier,
    Financial,
    Address,
}

/// Operations a caller can request for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Normalize,
    Validate,
    Dedupe,
    Consolidate,
    Harmonize,
    Enrich,
    Mask,
    OutlierCheck,
}

/// One entity record flowing through the pipeline.
///
/// Arbitrary fields live in `fields`; `id` is the caller-supplied identifier and
/// `parsed` is the slot a resolved address attaches to (serialized as `_parsed`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "lenient_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_parsed", default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<AddressFields>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: Option<&str>) -> Self {
        Self {
            id: id.map(str::to_string),
            ..Self::default()
        }
    }

    /// Builder-style field setter, mostly for tests and fixtures
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// String value of a field, `None` when missing, non-string or blank.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Rebuild a record from a loosely-typed JSON object, as returned by a model.
    ///
    /// Numeric ids are stringified and an `_parsed` value that does not fit
    /// [`AddressFields`] is dropped rather than failing the whole record.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let id = match object.remove("id") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let parsed = object
            .remove("_parsed")
            .and_then(|v| serde_json::from_value::<AddressFields>(v).ok())
            .filter(|p| !p.is_empty());
        Self { id, parsed, fields: object }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Number of fields carrying a meaningful value
    pub fn filled_field_count(&self) -> usize {
        self.fields.values().filter(|v| !is_blank(v)).count()
            + usize::from(self.id.is_some())
            + usize::from(self.parsed.is_some())
    }
}

/// True for null, empty strings, empty arrays and empty objects
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// String or numeric ids, as callers send both
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(de::Error::custom(format!("invalid record id: {}", other))),
    }
}

/// Resolved address fields. All-`None` means "resolved, nothing found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFields {
    #[serde(default)]
    pub thoroughfare: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub complement: Option<String>,
}

/// Outcome of a postal lookup
pub type LookupResult = AddressFields;

impl AddressFields {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.thoroughfare.is_none()
            && self.house_number.is_none()
            && self.neighborhood.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.postal_code.is_none()
            && self.country_code.is_none()
            && self.complement.is_none()
    }

    /// Fill every field that is `None` here from `other`.
    pub fn fill_missing_from(&mut self, other: &AddressFields) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.thoroughfare, &other.thoroughfare);
        fill(&mut self.house_number, &other.house_number);
        fill(&mut self.neighborhood, &other.neighborhood);
        fill(&mut self.city, &other.city);
        fill(&mut self.state, &other.state);
        fill(&mut self.postal_code, &other.postal_code);
        fill(&mut self.country_code, &other.country_code);
        fill(&mut self.complement, &other.complement);
    }
}

/// Normalized identity of a postal lookup: digits-only code plus upper-cased country.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    digits: String,
    country: String,
}

impl LookupKey {
    /// Normalize a raw postal code and region hint.
    ///
    /// Returns `None` when fewer than five digits remain, which callers treat
    /// as "not resolvable".
    pub fn parse(raw: &str, country: Option<&str>) -> Option<Self> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.len() < MIN_POSTAL_DIGITS {
            return None;
        }
        let country = country
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COUNTRY)
            .to_uppercase();
        Some(Self { digits, country })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// `DDDDD-DDD` for eight-digit codes, `None` otherwise
    pub fn hyphenated(&self) -> Option<String> {
        format_eight_digit_code(&self.digits)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.digits, self.country)
    }
}

/// Format an eight-digit postal code as `DDDDD-DDD`.
pub fn format_eight_digit_code(digits: &str) -> Option<String> {
    if digits.len() == 8 && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{}-{}", &digits[..5], &digits[5..]))
    } else {
        None
    }
}

/// A non-fatal failure of one record's stage operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub stage: String,
    #[serde(rename = "id")]
    pub record_id: Option<String>,
    #[serde(rename = "error")]
    pub message: String,
}

impl Issue {
    pub fn new(stage: &str, record_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            record_id,
            message: message.into(),
        }
    }
}

/// A pair of records scored as likely duplicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub i: usize,
    pub j: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Harmonization {
    pub codes: Vec<Value>,
    pub units: Vec<Value>,
}

/// Timing fact for one executed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub stage: String,
    pub records: usize,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub domain: Domain,
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub policies: Map<String, Value>,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub record_clean: Vec<Record>,
    pub golden_record: Option<Record>,
    pub matches: Vec<MatchCandidate>,
    pub harmonization: Harmonization,
    pub enrichment: Vec<Value>,
    pub issues: Vec<Issue>,
    pub actions: Vec<Value>,
    pub pii_masks: Map<String, Value>,
    pub audit_log: Vec<AuditEntry>,
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_key_strips_formatting() {
        let a = LookupKey::parse("01310-100", Some("br")).unwrap();
        let b = LookupKey::parse(" 01310100 ", None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digits(), "01310100");
        assert_eq!(a.country(), "BR");
        assert_eq!(a.hyphenated().as_deref(), Some("01310-100"));
    }

    #[test]
    fn lookup_key_rejects_short_codes() {
        assert!(LookupKey::parse("12-34", None).is_none());
        assert!(LookupKey::parse("", None).is_none());
        assert!(LookupKey::parse("12345", Some("US")).is_some());
    }

    #[test]
    fn same_digits_different_country_are_distinct() {
        let br = LookupKey::parse("12345", Some("BR")).unwrap();
        let us = LookupKey::parse("12345", Some("US")).unwrap();
        assert_ne!(br, us);
        assert_eq!(us.hyphenated(), None);
    }

    #[test]
    fn record_round_trips_parsed_slot() {
        let value = json!({
            "id": "r1",
            "name": "Ana",
            "_parsed": { "city": "São Paulo", "state": "SP" }
        });
        let record: Record = serde_json::from_value(value).unwrap();
        assert_eq!(record.id.as_deref(), Some("r1"));
        assert_eq!(record.get_str("name"), Some("Ana"));
        assert_eq!(record.parsed.as_ref().and_then(|p| p.city.as_deref()), Some("São Paulo"));
        assert!(!record.fields.contains_key("_parsed"));

        let back = record.to_value();
        assert_eq!(back["_parsed"]["state"], "SP");
        assert_eq!(back["id"], "r1");
    }

    #[test]
    fn numeric_ids_deserialize_as_strings() {
        let record: Record = serde_json::from_value(json!({ "id": 17, "name": "Ana" })).unwrap();
        assert_eq!(record.id.as_deref(), Some("17"));
        assert_eq!(record.get_str("name"), Some("Ana"));
        assert!(serde_json::from_value::<Record>(json!({ "id": [1] })).is_err());
    }

    #[test]
    fn from_object_tolerates_model_output() {
        let object = json!({ "id": 42, "_parsed": "garbage", "email": "a@b.c" });
        let record = Record::from_object(object.as_object().unwrap().clone());
        assert_eq!(record.id.as_deref(), Some("42"));
        assert!(record.parsed.is_none());
        assert_eq!(record.get_str("email"), Some("a@b.c"));
    }

    #[test]
    fn fill_missing_keeps_existing_values() {
        let mut resolved = AddressFields {
            city: Some("Curitiba".into()),
            ..AddressFields::default()
        };
        let guessed = AddressFields {
            city: Some("Curitba".into()),
            house_number: Some("12".into()),
            ..AddressFields::default()
        };
        resolved.fill_missing_from(&guessed);
        assert_eq!(resolved.city.as_deref(), Some("Curitiba"));
        assert_eq!(resolved.house_number.as_deref(), Some("12"));
    }

    #[test]
    fn issue_uses_wire_names() {
        let issue = Issue::new("normalize", Some("7".into()), "boom");
        let v = serde_json::to_value(&issue).unwrap();
        assert_eq!(v, json!({ "stage": "normalize", "id": "7", "error": "boom" }));
    }
}
