//! Strict typed view of the PV id listing.
//!
//! The remote API is loose about shapes: collections may be objects or
//! arrays, ids may be numbers or numeric strings, and inner `id` fields may
//! be missing entirely. All of that is settled here, once, so the index and
//! projection code only ever sees the shapes below.

use std::num::IntErrorKind;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("expected a JSON object at the top level, found {0}")]
    NotAnObject(&'static str),
}

/// A record together with the outer key it was listed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed<T> {
    pub key: String,
    pub record: T,
}

impl<T> Keyed<T> {
    /// The outer key parsed as an id, if it is numeric.
    #[must_use]
    pub fn key_id(&self) -> Option<i64> {
        parse_id_str(&self.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Author {
    #[serde(default, deserialize_with = "lenient_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawPost {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    /// `None` when the field is absent or not an array.
    #[serde(default, deserialize_with = "lenient_authors")]
    pub authors: Option<Vec<Author>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawUser {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReservedEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub user: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadedEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name_en: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub post: Option<i64>,
}

/// The two shapes `uploaded_pvs` has been served in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uploaded {
    /// Legacy shape: PV id key → list of candidate entries, reduced here to
    /// the first object in each list.
    ByKey(Vec<Keyed<UploadedEntry>>),
    /// Current shape: flat list of entries.
    List(Vec<UploadedEntry>),
}

impl Default for Uploaded {
    fn default() -> Self {
        Self::ByKey(Vec::new())
    }
}

impl Uploaded {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::ByKey(entries) => entries.len(),
            Self::List(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded listing. Entries that are not JSON objects are dropped during
/// decoding and counted in `malformed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub posts: Vec<Keyed<RawPost>>,
    pub users: Vec<Keyed<RawUser>>,
    pub reserved: Vec<Keyed<ReservedEntry>>,
    pub uploaded: Uploaded,
    pub malformed: usize,
}

impl Document {
    /// Decode a listing from raw JSON.
    ///
    /// Missing top-level collections, or collections of an unexpected type,
    /// decode as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the top-level value is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let mut root = match value {
            Value::Object(map) => map,
            other => return Err(DocumentError::NotAnObject(value_kind(&other))),
        };

        let mut malformed = 0;
        let posts = keyed_records(take_object(&mut root, "posts"), &mut malformed);
        let users = keyed_records(take_object(&mut root, "users"), &mut malformed);
        let reserved = keyed_records(take_object(&mut root, "reserved_pvs"), &mut malformed);
        let uploaded = decode_uploaded(root.remove("uploaded_pvs"), &mut malformed);

        Ok(Self {
            posts,
            users,
            reserved,
            uploaded,
            malformed,
        })
    }
}

fn take_object(root: &mut Map<String, Value>, field: &str) -> Map<String, Value> {
    match root.remove(field) {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            debug!(
                field,
                found = value_kind(&other),
                "Unexpected collection type, treating as empty"
            );
            Map::new()
        }
    }
}

fn keyed_records<T: DeserializeOwned>(
    map: Map<String, Value>,
    malformed: &mut usize,
) -> Vec<Keyed<T>> {
    let mut out = Vec::with_capacity(map.len());
    for (key, value) in map {
        match decode_record(value) {
            Some(record) => out.push(Keyed { key, record }),
            None => {
                debug!(key = %key, "Dropping non-object entry");
                *malformed += 1;
            }
        }
    }
    out
}

fn decode_uploaded(value: Option<Value>, malformed: &mut usize) -> Uploaded {
    match value {
        Some(Value::Object(map)) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, candidates) in map {
                let first = match candidates {
                    Value::Array(items) => items.into_iter().find_map(decode_record),
                    _ => None,
                };
                match first {
                    Some(record) => out.push(Keyed { key, record }),
                    None => {
                        debug!(key = %key, "Dropping uploaded key without an entry object");
                        *malformed += 1;
                    }
                }
            }
            Uploaded::ByKey(out)
        }
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match decode_record(item) {
                    Some(record) => out.push(record),
                    None => *malformed += 1,
                }
            }
            Uploaded::List(out)
        }
        None | Some(Value::Null) => Uploaded::default(),
        Some(other) => {
            debug!(
                field = "uploaded_pvs",
                found = value_kind(&other),
                "Unexpected collection type, treating as empty"
            );
            Uploaded::default()
        }
    }
}

/// Decode one record. Only JSON objects are records; every field decoder is
/// lenient, so an object never fails.
fn decode_record<T: DeserializeOwned>(value: Value) -> Option<T> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Interpret a JSON value as an integer id.
///
/// Accepts integers, finite floats (truncated toward zero) and strings
/// holding an integer (surrounding whitespace allowed). Integers beyond the
/// `i64` range saturate to `i64::MIN` / `i64::MAX`, so they still count as
/// present ids and fail any PV id range check.
#[must_use]
pub fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.is_u64().then_some(i64::MAX))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            }),
        Value::String(s) => parse_id_str(s),
        _ => None,
    }
}

/// Interpret a string (typically an object key) as an integer id, with the
/// same saturation as [`parse_id`].
#[must_use]
pub fn parse_id_str(s: &str) -> Option<i64> {
    match s.trim().parse::<i64>() {
        Ok(id) => Some(id),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_id(&value))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn lenient_authors<'de, D>(deserializer: D) -> Result<Option<Vec<Author>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(items.into_iter().filter_map(decode_record).collect())),
        _ => Ok(None),
    }
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
