use bytes::Bytes;
use ciborium::Value;
use tracing::{debug, warn};

use crate::conversions::cbor;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Action, CandidateRecord, Operation, POST_COLLECTION};

/// Decodes the record written by `operation` from its raw block.
///
/// Returns `None` for anything that is not a newly created post: non-create actions, other
/// collections, a missing block, or a block that does not parse as a post record. Parse
/// failures are logged and never propagated.
pub fn decode_record(operation: &Operation, raw_block: Option<&Bytes>) -> Option<CandidateRecord> {
    if operation.action != Action::Create || !operation.is_post() {
        return None;
    }

    let Some(raw_block) = raw_block else {
        debug!(path = %operation.path, "record block missing from archive");
        return None;
    };

    match parse_post(raw_block) {
        Ok(record) => record,
        Err(err) => {
            warn!(path = %operation.path, error = %err, "failed to decode post record");
            None
        }
    }
}

/// Parses a post block, returning `Ok(None)` for well-formed records that are not posts.
fn parse_post(raw_block: &[u8]) -> EtlResult<Option<CandidateRecord>> {
    let mut input = raw_block;
    let value = cbor::read_value(&mut input, ErrorKind::MalformedRecord)?;
    let entries = cbor::as_map(&value, ErrorKind::MalformedRecord)?;

    if let Some(record_type) = cbor::get_text(entries, "$type")
        && record_type != POST_COLLECTION
    {
        debug!(record_type, "record is not a post");
        return Ok(None);
    }

    let Some(text) = cbor::get_text(entries, "text") else {
        debug!("post record has no text");
        return Ok(None);
    };

    Ok(Some(CandidateRecord {
        text: text.to_string(),
        created_at: cbor::get_text(entries, "createdAt").map(str::to_string),
        langs: cbor::get(entries, "langs")
            .and_then(Value::as_array)
            .map(|langs| {
                langs
                    .iter()
                    .filter_map(Value::as_text)
                    .map(str::to_string)
                    .collect()
            }),
        embed: present(entries, "embed").cloned(),
        facets: present(entries, "facets")
            .and_then(Value::as_array)
            .cloned(),
        reply: present(entries, "reply").is_some(),
    }))
}

fn present<'a>(entries: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    cbor::get(entries, key).filter(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::builders::{PostBlock, post_block};

    fn create(path: &str) -> Operation {
        Operation {
            action: Action::Create,
            path: path.to_string(),
            cid: None,
        }
    }

    #[test]
    fn decodes_post_fields() {
        let (_, block) = PostBlock::new("loving #databs today")
            .created_at("2024-05-01T10:00:00.000Z")
            .langs(&["en", "pt"])
            .embed()
            .facets(1)
            .reply()
            .encode();

        let record = decode_record(&create("app.bsky.feed.post/abc"), Some(&block)).unwrap();

        assert_eq!(record.text, "loving #databs today");
        assert_eq!(record.created_at.as_deref(), Some("2024-05-01T10:00:00.000Z"));
        assert_eq!(record.langs, Some(vec!["en".to_string(), "pt".to_string()]));
        assert!(record.embed.is_some());
        assert_eq!(record.facets.map(|facets| facets.len()), Some(1));
        assert!(record.reply);
    }

    #[test]
    fn absent_optional_fields_are_none() {
        let (_, block) = post_block("plain", None);

        let record = decode_record(&create("app.bsky.feed.post/abc"), Some(&block)).unwrap();

        assert_eq!(record.created_at, None);
        assert_eq!(record.langs, None);
        assert_eq!(record.embed, None);
        assert_eq!(record.facets, None);
        assert!(!record.reply);
    }

    #[test]
    fn non_create_actions_have_no_record() {
        let (_, block) = post_block("#databs", None);
        let mut op = create("app.bsky.feed.post/abc");

        op.action = Action::Delete;
        assert!(decode_record(&op, Some(&block)).is_none());
        op.action = Action::Update;
        assert!(decode_record(&op, Some(&block)).is_none());
    }

    #[test]
    fn other_collections_have_no_record() {
        let (_, block) = post_block("#databs", None);
        assert!(decode_record(&create("app.bsky.feed.like/abc"), Some(&block)).is_none());
    }

    #[test]
    fn missing_or_garbage_blocks_have_no_record() {
        let op = create("app.bsky.feed.post/abc");

        assert!(decode_record(&op, None).is_none());
        assert!(decode_record(&op, Some(&Bytes::from_static(&[0xff, 0x00]))).is_none());
        assert!(decode_record(&op, Some(&Bytes::from_static(&[0x63, b'a']))).is_none());
    }

    #[test]
    fn foreign_record_types_have_no_record() {
        let (_, block) = PostBlock::new("#databs")
            .record_type("app.bsky.feed.like")
            .encode();

        assert!(decode_record(&create("app.bsky.feed.post/abc"), Some(&block)).is_none());
    }
}
