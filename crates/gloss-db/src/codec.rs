//! # Column Envelopes
//!
//! Structured values that live in a single TEXT column (crew snapshots,
//! role permissions and tags) are stored as a versioned envelope:
//!
//! ```text
//! {"v":1,"data":[{"employee_id":"…","name":"Dana"}]}
//! ```
//!
//! Rows written before envelopes existed hold the bare value; those decode
//! as version 1. Anything else is a [`DbError::Decode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use gloss_core::CrewMember;

use crate::error::{DbError, DbResult};

/// Current envelope version.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    v: u32,
    data: T,
}

pub fn encode<T: Serialize>(value: &T) -> DbResult<String> {
    serde_json::to_string(&EnvelopeRef {
        v: ENVELOPE_VERSION,
        data: value,
    })
    .map_err(|e| DbError::Internal(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    let value: Value = serde_json::from_str(raw).map_err(|e| DbError::decode(column, e))?;

    let is_envelope = value
        .as_object()
        .is_some_and(|o| o.contains_key("v") && o.contains_key("data"));

    if !is_envelope {
        return serde_json::from_value(value).map_err(|e| DbError::decode(column, e));
    }

    let envelope: Envelope<T> =
        serde_json::from_value(value).map_err(|e| DbError::decode(column, e))?;

    if envelope.v != ENVELOPE_VERSION {
        return Err(DbError::decode(
            column,
            format!("unsupported version {}", envelope.v),
        ));
    }

    Ok(envelope.data)
}

pub fn encode_crew(crew: &[CrewMember]) -> DbResult<String> {
    encode(&crew)
}

pub fn decode_crew(raw: &str) -> DbResult<Vec<CrewMember>> {
    decode("crew_snapshot", raw)
}

pub fn encode_strings(values: &[String]) -> DbResult<String> {
    encode(&values)
}

pub fn decode_strings(column: &str, raw: &str) -> DbResult<Vec<String>> {
    decode(column, raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crew_envelope_shape() {
        let crew = vec![CrewMember {
            employee_id: "e1".to_string(),
            name: "Dana".to_string(),
        }];
        let raw = encode_crew(&crew).unwrap();
        assert_eq!(raw, r#"{"v":1,"data":[{"employee_id":"e1","name":"Dana"}]}"#);
        assert_eq!(decode_crew(&raw).unwrap(), crew);
    }

    #[test]
    fn test_bare_legacy_value_decodes() {
        let tags = decode_strings("tags", r#"["pos_crew"]"#).unwrap();
        assert_eq!(tags, vec!["pos_crew".to_string()]);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let err = decode_strings("tags", r#"{"v":9,"data":[]}"#).unwrap_err();
        assert!(matches!(err, DbError::Decode { .. }));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(decode_crew("not json").is_err());
    }
}
