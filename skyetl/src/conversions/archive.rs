//! CAR v1 archive decoding.
//!
//! An archive is a varint-prefixed CBOR header followed by a sequence of varint-prefixed
//! sections, each holding a binary CID immediately followed by the block it addresses.

use bytes::Bytes;
use cid::Cid;
use std::collections::HashMap;

use crate::bail;
use crate::conversions::cbor;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// The only archive version understood by [`decode_archive`].
const SUPPORTED_CAR_VERSION: i64 = 1;

/// Maximum number of bytes an unsigned LEB128 varint may span for a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Blocks of an archive keyed by their content identifier.
pub type BlockMap = HashMap<Cid, Bytes>;

/// Decodes a CAR v1 archive into a map from CID to raw block.
///
/// Blocks are sliced out of `archive` without copying.
pub fn decode_archive(archive: &Bytes) -> EtlResult<BlockMap> {
    let mut offset = 0;

    let header_len = read_varint(archive, &mut offset)?;
    let header_end = section_end(archive, offset, header_len)?;
    let mut header = &archive[offset..header_end];
    let header = cbor::read_value(&mut header, ErrorKind::MalformedArchive)?;
    let entries = cbor::as_map(&header, ErrorKind::MalformedArchive)?;
    let version = cbor::require_i64(entries, "version", ErrorKind::MalformedArchive)?;
    if version != SUPPORTED_CAR_VERSION {
        bail!(
            ErrorKind::MalformedArchive,
            "Unsupported archive version",
            format!("expected version {SUPPORTED_CAR_VERSION}, found {version}")
        );
    }
    offset = header_end;

    let mut blocks = HashMap::new();
    while offset < archive.len() {
        let section_len = read_varint(archive, &mut offset)?;
        let end = section_end(archive, offset, section_len)?;

        let mut section = &archive[offset..end];
        let cid = Cid::read_bytes(&mut section).map_err(|err| {
            etl_error!(
                ErrorKind::MalformedArchive,
                "Invalid CID in archive section",
                source: err
            )
        })?;
        let block_start = end - section.len();
        blocks.insert(cid, archive.slice(block_start..end));

        offset = end;
    }

    Ok(blocks)
}

fn section_end(archive: &[u8], offset: usize, len: u64) -> EtlResult<usize> {
    let end = usize::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .filter(|end| *end <= archive.len());

    match end {
        Some(end) => Ok(end),
        None => bail!(
            ErrorKind::MalformedArchive,
            "Archive section exceeds payload",
            format!(
                "section of {len} bytes at offset {offset}, payload is {} bytes",
                archive.len()
            )
        ),
    }
}

/// Reads an unsigned LEB128 varint starting at `offset` and advances it.
pub(crate) fn read_varint(input: &[u8], offset: &mut usize) -> EtlResult<u64> {
    let mut value: u64 = 0;

    for (i, byte) in input[*offset..].iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            *offset += i + 1;
            return Ok(value);
        }
    }

    bail!(
        ErrorKind::MalformedArchive,
        "Truncated or oversized varint",
        format!("at offset {}", *offset)
    );
}
