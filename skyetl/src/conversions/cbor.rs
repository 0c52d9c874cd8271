//! Helpers for reading DAG-CBOR values.

use ciborium::Value;
use cid::Cid;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// CBOR tag used by DAG-CBOR to mark a content identifier link.
pub const CID_LINK_TAG: u64 = 42;

/// Leading multibase identity prefix carried by the bytes of a CID link.
const CID_LINK_PREFIX: u8 = 0x00;

/// Reads exactly one CBOR item from the front of `input`, advancing the slice past it.
pub fn read_value(input: &mut &[u8], kind: ErrorKind) -> EtlResult<Value> {
    ciborium::de::from_reader(&mut *input)
        .map_err(|err| etl_error!(kind, "Invalid CBOR item", err.to_string()))
}

/// Returns the entries of a map value.
pub fn as_map(value: &Value, kind: ErrorKind) -> EtlResult<&[(Value, Value)]> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => bail!(
            kind,
            "Expected a CBOR map",
            format!("found {}", value_type(other))
        ),
    }
}

/// Looks up a text key in map entries.
pub fn get<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

/// Returns the text under `key`, treating `null` as absent.
pub fn get_text<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a str> {
    get(entries, key).and_then(Value::as_text)
}

/// Returns a required text field.
pub fn require_text<'a>(
    entries: &'a [(Value, Value)],
    key: &'static str,
    kind: ErrorKind,
) -> EtlResult<&'a str> {
    get_text(entries, key).ok_or_else(|| etl_error!(kind, "Missing or non-text field", key))
}

/// Returns a required integer field.
pub fn require_i64(entries: &[(Value, Value)], key: &'static str, kind: ErrorKind) -> EtlResult<i64> {
    let Some(integer) = get(entries, key).and_then(Value::as_integer) else {
        bail!(kind, "Missing or non-integer field", key);
    };

    i64::try_from(integer).map_err(|_| etl_error!(kind, "Integer field out of range", key))
}

/// Returns the boolean under `key`, defaulting to `false` when absent.
pub fn get_bool(entries: &[(Value, Value)], key: &str) -> bool {
    get(entries, key).and_then(Value::as_bool).unwrap_or(false)
}

/// Decodes a DAG-CBOR link (tag 42) into a [`Cid`].
pub fn cid_link(value: &Value, kind: ErrorKind) -> EtlResult<Cid> {
    let Value::Tag(CID_LINK_TAG, inner) = value else {
        bail!(
            kind,
            "Expected a CID link",
            format!("found {}", value_type(value))
        );
    };
    let Some(bytes) = inner.as_bytes() else {
        bail!(kind, "CID link does not wrap a byte string");
    };

    match bytes.split_first() {
        Some((&CID_LINK_PREFIX, raw)) => {
            Cid::try_from(raw).map_err(|err| etl_error!(kind, "Invalid CID link", source: err))
        }
        _ => bail!(kind, "CID link is missing its multibase prefix"),
    }
}

/// Short name of a value's CBOR type, for error details.
pub fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(_, _) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Text(k.to_string()), v))
                .collect(),
        )
    }

    #[test]
    fn reads_consecutive_items() {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&map(vec![("op", Value::Integer(1.into()))]), &mut buf).unwrap();
        ciborium::ser::into_writer(&Value::Text("body".to_string()), &mut buf).unwrap();

        let mut input = buf.as_slice();
        let header = read_value(&mut input, ErrorKind::MalformedFrame).unwrap();
        let body = read_value(&mut input, ErrorKind::MalformedFrame).unwrap();

        let entries = as_map(&header, ErrorKind::MalformedFrame).unwrap();
        assert_eq!(require_i64(entries, "op", ErrorKind::MalformedFrame).unwrap(), 1);
        assert_eq!(body.as_text(), Some("body"));
        assert!(input.is_empty());
    }

    #[test]
    fn null_text_is_absent() {
        let value = map(vec![("createdAt", Value::Null)]);
        let entries = as_map(&value, ErrorKind::MalformedRecord).unwrap();

        assert_eq!(get_text(entries, "createdAt"), None);
        assert!(require_text(entries, "createdAt", ErrorKind::MalformedRecord).is_err());
    }

    #[test]
    fn cid_link_requires_tag_and_prefix() {
        let err = cid_link(&Value::Bytes(vec![0, 1]), ErrorKind::MalformedFrame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedFrame);

        let untagged_prefix =
            Value::Tag(CID_LINK_TAG, Box::new(Value::Bytes(vec![0x01, 0x71])));
        assert!(cid_link(&untagged_prefix, ErrorKind::MalformedFrame).is_err());
    }
}
