// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Byte-level framing for stored blocks.
//!
//! Every block placed in a [`DistributedStore`](crate::store::DistributedStore)
//! is wrapped in a small explicit frame:
//!
//! ```text
//! [magic: u32 LE][flags: u8][payload_len: u32 LE][payload bytes]
//! ```
//!
//! The only defined flag is `FLAG_FINAL` (bit 0), set when the block was
//! produced by a short read at end of file. Consumers treat the flag as a
//! diagnostic; terminal-block detection goes through the last-sequence
//! vector exchanged during boundary repair, never through the flag.

use crate::error::{Result, ShardlineError};

const MAGIC: u32 = 0x5348_4C42; // "SHLB"

/// Set when the block was produced by a short read at end of file.
pub const FLAG_FINAL: u8 = 0x01;

const HEADER_LEN: usize = 9;

/// A decoded view of one framed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFrame<'a> {
    /// Whether the producing reader hit end of file inside this block.
    pub is_final: bool,
    /// The block's raw bytes.
    pub payload: &'a [u8],
}

/// Encodes a block payload into a framed byte vector.
pub fn encode_block(payload: &[u8], is_final: bool) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        ShardlineError::Internal(format!(
            "block payload of {} bytes exceeds the frame length field",
            payload.len()
        ))
    })?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.push(if is_final { FLAG_FINAL } else { 0 });
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes a framed block, validating magic, flags, and length.
pub fn decode_block(buf: &[u8]) -> Result<BlockFrame<'_>> {
    if buf.len() < HEADER_LEN {
        return Err(ShardlineError::Internal(format!(
            "block frame of {} bytes is shorter than the {HEADER_LEN} byte header",
            buf.len()
        )));
    }
    let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC {
        return Err(ShardlineError::Internal(format!(
            "bad block frame magic {magic:#010x}"
        )));
    }
    let flags = buf[4];
    if flags & !FLAG_FINAL != 0 {
        return Err(ShardlineError::Internal(format!(
            "unknown block frame flags {flags:#04x}"
        )));
    }
    let len = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
    if buf.len() != HEADER_LEN + len {
        return Err(ShardlineError::Internal(format!(
            "block frame length mismatch: header says {len}, got {}",
            buf.len() - HEADER_LEN
        )));
    }
    Ok(BlockFrame {
        is_final: flags & FLAG_FINAL != 0,
        payload: &buf[HEADER_LEN..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let encoded = encode_block(b"a,1\nb,2\n", true).unwrap();
        let frame = decode_block(&encoded).unwrap();
        assert!(frame.is_final);
        assert_eq!(frame.payload, b"a,1\nb,2\n");
    }

    #[test]
    fn test_empty_payload() {
        let encoded = encode_block(b"", false).unwrap();
        let frame = decode_block(&encoded).unwrap();
        assert!(!frame.is_final);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_rejects_truncated_frame() {
        let mut encoded = encode_block(b"abcdef", false).unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(decode_block(&encoded).is_err());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut encoded = encode_block(b"abc", false).unwrap();
        encoded[0] ^= 0xff;
        assert!(decode_block(&encoded).is_err());
    }

    #[test]
    fn test_rejects_unknown_flags() {
        let mut encoded = encode_block(b"abc", false).unwrap();
        encoded[4] = 0x80;
        assert!(decode_block(&encoded).is_err());
    }

    #[test]
    fn test_rejects_short_header() {
        assert!(decode_block(&[0u8; 4]).is_err());
    }
}
