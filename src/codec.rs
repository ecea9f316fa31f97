//! Record wire codec.
//!
//! Each record in a segment is a length-prefixed, checksummed frame:
//!
//! ```text
//! [length: u32 BE][payload: length bytes][crc32: u32 BE]
//! ```
//!
//! - **length**: payload size only (not including prefix or trailer)
//! - **payload**: JSON-serialized [`DlqEntry`]
//! - **crc32**: CRC32 checksum over the payload
//!
//! The length prefix lets the reader frame variable-sized records; the
//! checksum detects bit flips and partial overwrites. A frame shorter than
//! its declared length is reported as [`DecodeError::Truncated`], which at
//! the tail of the current segment means "wait for more bytes" rather than
//! corruption.
//!
//! The encode half exists for the producing side and for test fixtures;
//! the tailer itself never writes segments.

use crc32fast::Hasher;

use crate::entry::DlqEntry;
use crate::error::DecodeError;

/// Bytes of length prefix preceding each payload.
pub const RECORD_PREFIX_LEN: usize = 4;
/// Bytes of checksum trailing each payload.
pub const RECORD_TRAILER_LEN: usize = 4;

/// Sanity cap on declared payload length. A longer declaration is treated
/// as corruption rather than an allocation request.
pub const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Encode one entry into a record frame.
pub fn encode_record(entry: &DlqEntry) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(entry)?;

    let mut buf = Vec::with_capacity(RECORD_PREFIX_LEN + payload.len() + RECORD_TRAILER_LEN);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&checksum(&payload).to_be_bytes());

    Ok(buf)
}

/// Decode one record frame from the start of `buf`.
///
/// `offset` is the absolute byte position of `buf[0]` within the segment,
/// used for error context only. On success returns the entry and the number
/// of bytes consumed; the caller's next cursor offset is `offset + consumed`.
pub fn decode_record(buf: &[u8], offset: u64) -> Result<(DlqEntry, usize), DecodeError> {
    if buf.len() < RECORD_PREFIX_LEN {
        return Err(DecodeError::Truncated {
            offset,
            have: buf.len(),
            needed: RECORD_PREFIX_LEN,
        });
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if length == 0 || length > MAX_RECORD_LEN {
        return Err(DecodeError::InvalidLength { length, offset });
    }

    let frame_len = RECORD_PREFIX_LEN + length as usize + RECORD_TRAILER_LEN;
    if buf.len() < frame_len {
        return Err(DecodeError::Truncated {
            offset,
            have: buf.len(),
            needed: frame_len,
        });
    }

    let payload = &buf[RECORD_PREFIX_LEN..RECORD_PREFIX_LEN + length as usize];
    let crc_start = RECORD_PREFIX_LEN + length as usize;
    let expected = u32::from_be_bytes([
        buf[crc_start],
        buf[crc_start + 1],
        buf[crc_start + 2],
        buf[crc_start + 3],
    ]);

    let computed = checksum(payload);
    if computed != expected {
        return Err(DecodeError::CrcMismatch {
            offset,
            expected,
            computed,
        });
    }

    let entry: DlqEntry =
        serde_json::from_slice(payload).map_err(|source| DecodeError::Payload { offset, source })?;

    Ok((entry, frame_len))
}
