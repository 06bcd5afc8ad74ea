//! The wire codec: deterministic, length-prefixed encoding of [`TagSet`]s.
//!
//! Used to carry tag sets across process boundaries (e.g. in the
//! `grpc-stats-bin` header an RPC adapter attaches to outgoing calls). The
//! framing for that header is the adapter's concern; this module only
//! produces and consumes the inner byte sequence.

use crate::key::{new_key, KeyKind};
use crate::tag::TagSet;
use crate::value::Value;

/// Errors returned by [`decode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended in the middle of a varint length prefix.
    #[error("truncated length prefix at byte {offset}")]
    TruncatedLength {
        /// Byte offset where the truncated varint starts.
        offset: usize,
    },
    /// A decoded length claims more bytes than remain in the buffer.
    #[error("value at byte {offset} claims length {claimed} but only {remaining} bytes remain")]
    ValueOverflow {
        /// Byte offset of the value whose length overflowed.
        offset: usize,
        /// The length the prefix claimed.
        claimed: u64,
        /// The number of bytes actually remaining.
        remaining: usize,
    },
    /// The decoded bytes for a key or value were not valid UTF-8.
    #[error("non-UTF-8 bytes at byte {offset}")]
    InvalidUtf8 {
        /// Byte offset of the invalid sequence.
        offset: usize,
    },
    /// The decoded key name collides with an already-registered key of a
    /// different kind (see [`crate::key::KeyError::Conflict`]).
    #[error("key registry conflict while decoding: {0}")]
    KeyConflict(#[from] crate::key::KeyError),
}

/// Encode a [`TagSet`] as `varint(len(k)) || k || varint(len(v)) || v` per
/// entry, in canonical (key-name-sorted) order. Deterministic: the same
/// `TagSet` always produces the same bytes.
pub fn encode(tag_set: &TagSet) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in tag_set.iter() {
        let k = key.name().as_bytes();
        let v = value.to_canonical_bytes();
        write_varint(&mut out, k.len() as u64);
        out.extend_from_slice(k);
        write_varint(&mut out, v.len() as u64);
        out.extend_from_slice(&v);
    }
    out
}

/// Decode bytes produced by [`encode`] back into a [`TagSet`].
///
/// Decoded keys are resolved via [`new_key`] with [`KeyKind::String`]: any
/// name seen for the first time is registered as a string key; a name that
/// collides with an already-registered key of a different kind is a
/// [`DecodeError::KeyConflict`]. This matches the round-trip property for
/// any `TagSet` built only from string keys.
pub fn decode(bytes: &[u8]) -> Result<TagSet, DecodeError> {
    let mut builder = crate::tag::TagSetBuilder::start_empty();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let key_start = pos;
        let klen = read_varint(bytes, &mut pos)
            .ok_or(DecodeError::TruncatedLength { offset: key_start })?;
        let klen = klen as usize;
        if pos + klen > bytes.len() {
            return Err(DecodeError::ValueOverflow {
                offset: key_start,
                claimed: klen as u64,
                remaining: bytes.len() - pos,
            });
        }
        let key_bytes = &bytes[pos..pos + klen];
        pos += klen;
        let key_name = std::str::from_utf8(key_bytes)
            .map_err(|_| DecodeError::InvalidUtf8 { offset: key_start })?;

        let val_start = pos;
        let vlen = read_varint(bytes, &mut pos)
            .ok_or(DecodeError::TruncatedLength { offset: val_start })?;
        let vlen = vlen as usize;
        if pos + vlen > bytes.len() {
            return Err(DecodeError::ValueOverflow {
                offset: val_start,
                claimed: vlen as u64,
                remaining: bytes.len() - pos,
            });
        }
        let val_bytes = &bytes[pos..pos + vlen];
        pos += vlen;
        let value_str = std::str::from_utf8(val_bytes)
            .map_err(|_| DecodeError::InvalidUtf8 { offset: val_start })?;

        let key = new_key(key_name, KeyKind::String)?;
        builder = builder
            .upsert(key, Value::String(value_str.to_owned()), crate::tag::Behavior::AddOrReplace)
            .expect("string value always matches a string key");
    }

    Ok(builder.build())
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Option<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}
