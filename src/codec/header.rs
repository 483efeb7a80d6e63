use bitcoin::{BlockHash, block::Header, consensus};

use super::CodecError;

pub const HEADER_LEN: usize = 80;

/// Parse the 80-byte header at the front of a serialized block. Anything
/// after the header is ignored.
pub fn parse_block_header(bytes: &[u8]) -> Result<Header, CodecError> {
    let raw = bytes
        .get(..HEADER_LEN)
        .ok_or(CodecError::MalformedHeader(bytes.len()))?;

    consensus::deserialize::<Header>(raw).map_err(|_| CodecError::MalformedHeader(bytes.len()))
}

/// Double-SHA256 of the header, in the byte-reversed display order
pub fn block_hash(bytes: &[u8]) -> Result<BlockHash, CodecError> {
    Ok(parse_block_header(bytes)?.block_hash())
}

/// Timestamp of a hex-encoded header as returned by the node
pub fn header_time_from_hex(header_hex: &str) -> Option<u32> {
    let bytes = hex::decode(header_hex).ok()?;

    parse_block_header(&bytes).ok().map(|h| h.time)
}
