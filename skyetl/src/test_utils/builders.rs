//! Builders for wire-format test fixtures.

use bytes::Bytes;
use ciborium::Value;
use cid::Cid;
use cid::multihash::Multihash;
use sha2::{Digest, Sha256};

use crate::conversions::cbor::CID_LINK_TAG;
use crate::types::{Action, CommitEvent, Operation, POST_COLLECTION, PostRow, Seq};

/// Multicodec code for DAG-CBOR blocks.
const DAG_CBOR_CODEC: u64 = 0x71;
/// Multihash code for SHA2-256.
const SHA2_256_CODE: u64 = 0x12;

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn entry(key: &str, value: Value) -> (Value, Value) {
    (text(key), value)
}

/// Encodes a single CBOR value.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buffer = Vec::new();
    ciborium::into_writer(value, &mut buffer).expect("encoding into a vec cannot fail");
    buffer
}

/// Computes the CIDv1 of a DAG-CBOR block.
pub fn block_cid(block: &[u8]) -> Cid {
    let digest = Sha256::digest(block);
    let hash = Multihash::<64>::wrap(SHA2_256_CODE, &digest).expect("sha2-256 digest fits");
    Cid::new_v1(DAG_CBOR_CODEC, hash)
}

/// Encodes `cid` as a DAG-CBOR link.
pub fn cid_link(cid: &Cid) -> Value {
    let mut bytes = vec![0x00];
    bytes.extend_from_slice(&cid.to_bytes());
    Value::Tag(CID_LINK_TAG, Box::new(Value::Bytes(bytes)))
}

fn push_varint(buffer: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buffer.push(byte);
            return;
        }
        buffer.push(byte | 0x80);
    }
}

/// Builder for a post record block.
#[derive(Debug, Clone)]
pub struct PostBlock {
    text: String,
    record_type: String,
    created_at: Option<String>,
    langs: Option<Vec<String>>,
    embed: bool,
    facets: usize,
    reply: bool,
}

impl PostBlock {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            record_type: POST_COLLECTION.to_string(),
            created_at: None,
            langs: None,
            embed: false,
            facets: 0,
            reply: false,
        }
    }

    pub fn created_at(mut self, created_at: &str) -> Self {
        self.created_at = Some(created_at.to_string());
        self
    }

    pub fn langs(mut self, langs: &[&str]) -> Self {
        self.langs = Some(langs.iter().map(|lang| lang.to_string()).collect());
        self
    }

    pub fn embed(mut self) -> Self {
        self.embed = true;
        self
    }

    pub fn facets(mut self, count: usize) -> Self {
        self.facets = count;
        self
    }

    pub fn reply(mut self) -> Self {
        self.reply = true;
        self
    }

    pub fn record_type(mut self, record_type: &str) -> Self {
        self.record_type = record_type.to_string();
        self
    }

    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            entry("$type", text(&self.record_type)),
            entry("text", text(&self.text)),
        ];
        if let Some(created_at) = &self.created_at {
            entries.push(entry("createdAt", text(created_at)));
        }
        if let Some(langs) = &self.langs {
            entries.push(entry(
                "langs",
                Value::Array(langs.iter().map(|lang| text(lang)).collect()),
            ));
        }
        if self.embed {
            entries.push(entry(
                "embed",
                Value::Map(vec![entry("$type", text("app.bsky.embed.external"))]),
            ));
        }
        if self.facets > 0 {
            let facet = Value::Map(vec![entry("$type", text("app.bsky.richtext.facet"))]);
            entries.push(entry("facets", Value::Array(vec![facet; self.facets])));
        }
        if self.reply {
            entries.push(entry(
                "reply",
                Value::Map(vec![
                    entry("root", Value::Map(vec![])),
                    entry("parent", Value::Map(vec![])),
                ]),
            ));
        }

        Value::Map(entries)
    }

    /// Encodes the record, returning its CID and raw block.
    pub fn encode(&self) -> (Cid, Bytes) {
        let block = encode_value(&self.to_value());
        (block_cid(&block), Bytes::from(block))
    }
}

/// Shorthand for a post block with only text and an optional creation time.
pub fn post_block(text: &str, created_at: Option<&str>) -> (Cid, Bytes) {
    let mut block = PostBlock::new(text);
    if let Some(created_at) = created_at {
        block = block.created_at(created_at);
    }
    block.encode()
}

/// Builds a CAR v1 archive holding `blocks`, with no roots.
pub fn build_car(blocks: &[(Cid, Bytes)]) -> Bytes {
    let header = encode_value(&Value::Map(vec![
        entry("version", Value::Integer(1.into())),
        entry("roots", Value::Array(vec![])),
    ]));

    let mut car = Vec::new();
    push_varint(&mut car, header.len() as u64);
    car.extend_from_slice(&header);

    for (cid, block) in blocks {
        let cid = cid.to_bytes();
        push_varint(&mut car, (cid.len() + block.len()) as u64);
        car.extend_from_slice(&cid);
        car.extend_from_slice(block);
    }

    Bytes::from(car)
}

/// Encodes a frame from a header `op`, an optional message type and a body.
pub fn encode_frame(op: i64, kind: Option<&str>, body: Value) -> Bytes {
    let mut header = vec![entry("op", Value::Integer(op.into()))];
    if let Some(kind) = kind {
        header.push(entry("t", text(kind)));
    }

    let mut frame = encode_value(&Value::Map(header));
    frame.extend(encode_value(&body));
    Bytes::from(frame)
}

/// Encodes an error frame.
pub fn error_frame(error: &str, message: Option<&str>) -> Bytes {
    let mut body = vec![entry("error", text(error))];
    if let Some(message) = message {
        body.push(entry("message", text(message)));
    }
    encode_frame(-1, None, Value::Map(body))
}

/// Encodes an `#info` frame.
pub fn info_frame(name: &str) -> Bytes {
    encode_frame(1, Some("#info"), Value::Map(vec![entry("name", text(name))]))
}

/// Builder for commits, either as decoded [`CommitEvent`]s or as encoded frames.
#[derive(Debug, Clone)]
pub struct CommitBuilder {
    seq: Seq,
    repo: String,
    ops: Vec<Operation>,
    blocks: Vec<(Cid, Bytes)>,
    too_big: bool,
    corrupt_blocks: bool,
}

impl CommitBuilder {
    pub fn new(seq: Seq, repo: &str) -> Self {
        Self {
            seq,
            repo: repo.to_string(),
            ops: Vec::new(),
            blocks: Vec::new(),
            too_big: false,
            corrupt_blocks: false,
        }
    }

    /// Adds the creation of a post with record key `rkey`.
    pub fn create_post(self, rkey: &str, cid: Cid, block: Bytes) -> Self {
        self.create(&format!("{POST_COLLECTION}/{rkey}"), cid, block)
    }

    /// Adds the creation of an arbitrary record at `path`.
    pub fn create(mut self, path: &str, cid: Cid, block: Bytes) -> Self {
        self.ops.push(Operation {
            action: Action::Create,
            path: path.to_string(),
            cid: Some(cid),
        });
        self.blocks.push((cid, block));
        self
    }

    /// Adds a post creation whose block is left out of the archive.
    pub fn create_post_without_block(mut self, rkey: &str, cid: Cid) -> Self {
        self.ops.push(Operation {
            action: Action::Create,
            path: format!("{POST_COLLECTION}/{rkey}"),
            cid: Some(cid),
        });
        self
    }

    pub fn delete(mut self, path: &str) -> Self {
        self.ops.push(Operation {
            action: Action::Delete,
            path: path.to_string(),
            cid: None,
        });
        self
    }

    /// Marks the commit as too big, which also drops its blocks.
    pub fn too_big(mut self) -> Self {
        self.too_big = true;
        self
    }

    /// Replaces the archive with bytes that do not decode.
    pub fn corrupt_blocks(mut self) -> Self {
        self.corrupt_blocks = true;
        self
    }

    fn archive(&self) -> Option<Bytes> {
        if self.too_big {
            None
        } else if self.corrupt_blocks {
            Some(Bytes::from_static(&[0x0a, 0xa1, 0x67]))
        } else {
            Some(build_car(&self.blocks))
        }
    }

    pub fn build(&self) -> CommitEvent {
        CommitEvent {
            seq: self.seq,
            repo: self.repo.clone(),
            ops: self.ops.clone(),
            blocks: self.archive(),
            too_big: self.too_big,
            time: Some("2024-05-01T10:00:00.000Z".to_string()),
        }
    }

    /// Encodes the commit as a `#commit` frame.
    pub fn to_frame(&self) -> Bytes {
        let ops = self
            .ops
            .iter()
            .map(|op| {
                Value::Map(vec![
                    entry("action", text(op.action.as_str())),
                    entry("path", text(&op.path)),
                    entry("cid", op.cid.as_ref().map(cid_link).unwrap_or(Value::Null)),
                ])
            })
            .collect();

        let mut body = vec![
            entry("seq", Value::Integer(self.seq.into())),
            entry("repo", text(&self.repo)),
            entry("rebase", Value::Bool(false)),
            entry("tooBig", Value::Bool(self.too_big)),
            entry("ops", Value::Array(ops)),
            entry("time", text("2024-05-01T10:00:00.000Z")),
        ];
        if let Some(archive) = self.archive() {
            body.push(entry("blocks", Value::Bytes(archive.to_vec())));
        }

        encode_frame(1, Some("#commit"), Value::Map(body))
    }
}

/// Builds a row with fixed content for `uri` and `hashtag`.
pub fn row(uri: &str, hashtag: &str) -> PostRow {
    PostRow {
        uri: uri.to_string(),
        cid: "bafyreib2rxk3rh6kzwq".to_string(),
        author: "did:plc:alice".to_string(),
        text: format!("post about #{hashtag}"),
        created_at: Some("2024-05-01T10:00:00.000Z".to_string()),
        hashtag: hashtag.to_string(),
        langs: Some("en".to_string()),
    }
}
