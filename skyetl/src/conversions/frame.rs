//! Decoding of upstream subscription frames.

use bytes::Bytes;
use ciborium::Value;
use tracing::debug;

use crate::bail;
use crate::conversions::cbor;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Action, CommitEvent, FirehoseMessage, Operation};

/// Header `op` value of a regular message frame.
const OP_MESSAGE: i64 = 1;
/// Header `op` value of an error frame.
const OP_ERROR: i64 = -1;

const TYPE_COMMIT: &str = "#commit";
const TYPE_INFO: &str = "#info";

/// Decodes one binary frame into a [`FirehoseMessage`].
///
/// A frame is two concatenated CBOR items: a header `{op, t}` and the message body.
pub fn decode_frame(frame: &[u8]) -> EtlResult<FirehoseMessage> {
    let mut input = frame;
    let header = cbor::read_value(&mut input, ErrorKind::MalformedFrame)?;
    let body = cbor::read_value(&mut input, ErrorKind::MalformedFrame)?;

    let header = cbor::as_map(&header, ErrorKind::MalformedFrame)?;
    let op = cbor::require_i64(header, "op", ErrorKind::MalformedFrame)?;
    let body = cbor::as_map(&body, ErrorKind::MalformedFrame)?;

    match op {
        OP_ERROR => Ok(FirehoseMessage::Error {
            error: cbor::get_text(body, "error").unwrap_or("Unknown").to_string(),
            message: cbor::get_text(body, "message").map(str::to_string),
        }),
        OP_MESSAGE => {
            let kind = cbor::require_text(header, "t", ErrorKind::MalformedFrame)?;
            match kind {
                TYPE_COMMIT => decode_commit(body).map(FirehoseMessage::Commit),
                TYPE_INFO => Ok(FirehoseMessage::Info {
                    name: cbor::get_text(body, "name").unwrap_or_default().to_string(),
                    message: cbor::get_text(body, "message").map(str::to_string),
                }),
                other => Ok(FirehoseMessage::Other {
                    kind: other.to_string(),
                }),
            }
        }
        other => bail!(
            ErrorKind::MalformedFrame,
            "Unknown frame op",
            format!("op {other}")
        ),
    }
}

fn decode_commit(body: &[(Value, Value)]) -> EtlResult<CommitEvent> {
    let seq = cbor::require_i64(body, "seq", ErrorKind::MalformedFrame)?;
    let repo = cbor::require_text(body, "repo", ErrorKind::MalformedFrame)?.to_string();

    let Some(raw_ops) = cbor::get(body, "ops").and_then(Value::as_array) else {
        bail!(
            ErrorKind::MalformedFrame,
            "Commit has no operation list",
            format!("seq {seq}")
        );
    };
    let mut ops = Vec::with_capacity(raw_ops.len());
    for raw_op in raw_ops {
        if let Some(op) = decode_operation(raw_op)? {
            ops.push(op);
        }
    }

    let blocks = cbor::get(body, "blocks")
        .and_then(Value::as_bytes)
        .map(|blocks| Bytes::copy_from_slice(blocks));

    Ok(CommitEvent {
        seq,
        repo,
        ops,
        blocks,
        too_big: cbor::get_bool(body, "tooBig"),
        time: cbor::get_text(body, "time").map(str::to_string),
    })
}

fn decode_operation(raw_op: &Value) -> EtlResult<Option<Operation>> {
    let entries = cbor::as_map(raw_op, ErrorKind::MalformedFrame)?;
    let raw_action = cbor::require_text(entries, "action", ErrorKind::MalformedFrame)?;
    let path = cbor::require_text(entries, "path", ErrorKind::MalformedFrame)?;

    let Some(action) = Action::from_wire(raw_action) else {
        debug!(action = raw_action, path, "skipping operation with unknown action");
        return Ok(None);
    };

    let cid = match cbor::get(entries, "cid") {
        None | Some(Value::Null) => None,
        Some(link) => Some(cbor::cid_link(link, ErrorKind::MalformedFrame)?),
    };

    Ok(Some(Operation {
        action,
        path: path.to_string(),
        cid,
    }))
}
