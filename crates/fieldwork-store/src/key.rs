use std::str::FromStr;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Order-preserving, hashable byte encoding of a BSON value.
///
/// `Bson` is neither `Eq` nor `Hash`, so identifiers and compared field
/// values are keyed through this type. Integers of either width (and
/// integral doubles) share one numeric encoding so `1`, `1_i64` and `1.0`
/// are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BsonKey(Vec<u8>);

const TAG_NULL: u8 = 0x05;
const TAG_INT: u8 = 0x10;
const TAG_DOUBLE: u8 = 0x11;
const TAG_STRING: u8 = 0x20;
const TAG_OBJECT_ID: u8 = 0x30;
const TAG_BOOL: u8 = 0x40;
const TAG_OTHER: u8 = 0x7f;

impl BsonKey {
    pub fn new(value: &Bson) -> Self {
        let mut buf = Vec::with_capacity(16);
        match value {
            Bson::Null => buf.push(TAG_NULL),
            Bson::Int32(n) => encode_int(&mut buf, *n as i64),
            Bson::Int64(n) => encode_int(&mut buf, *n),
            Bson::Double(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                encode_int(&mut buf, *n as i64)
            }
            Bson::Double(n) => {
                buf.push(TAG_DOUBLE);
                let bits = n.to_bits();
                // Flip so negative doubles sort before positive ones
                let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
                buf.extend_from_slice(&ordered.to_be_bytes());
            }
            Bson::String(s) => {
                buf.push(TAG_STRING);
                buf.extend_from_slice(s.as_bytes());
            }
            Bson::ObjectId(oid) => {
                buf.push(TAG_OBJECT_ID);
                buf.extend_from_slice(&oid.bytes());
            }
            Bson::Boolean(b) => {
                buf.push(TAG_BOOL);
                buf.push(u8::from(*b));
            }
            other => {
                buf.push(TAG_OTHER);
                let mut wrapper = Document::new();
                wrapper.insert("v", other.clone());
                if wrapper.to_writer(&mut buf).is_err() {
                    buf.extend_from_slice(format!("{other:?}").as_bytes());
                }
            }
        }
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn encode_int(buf: &mut Vec<u8>, n: i64) {
    buf.push(TAG_INT);
    buf.extend_from_slice(&((n as u64) ^ (1 << 63)).to_be_bytes());
}

impl From<&Bson> for BsonKey {
    fn from(value: &Bson) -> Self {
        BsonKey::new(value)
    }
}

/// Native identifier type used when reading identifiers from flat files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    #[default]
    ObjectId,
    String,
    Int,
}

impl FromStr for IdKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object_id" | "objectid" | "oid" => Ok(IdKind::ObjectId),
            "string" => Ok(IdKind::String),
            "int" | "integer" => Ok(IdKind::Int),
            other => Err(StoreError::InvalidId(format!("unknown id kind: {other}"))),
        }
    }
}

/// Parse one textual identifier into the store's native type.
pub fn parse_id(text: &str, kind: IdKind) -> Result<Bson, StoreError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(StoreError::InvalidId("empty identifier".into()));
    }
    match kind {
        IdKind::ObjectId => ObjectId::parse_str(text)
            .map(Bson::ObjectId)
            .map_err(|e| StoreError::InvalidId(format!("{text}: {e}"))),
        IdKind::String => Ok(Bson::String(text.to_string())),
        IdKind::Int => text
            .parse::<i64>()
            .map(Bson::Int64)
            .map_err(|e| StoreError::InvalidId(format!("{text}: {e}"))),
    }
}
