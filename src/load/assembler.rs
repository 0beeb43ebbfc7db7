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

//! Record reconstruction from a repaired block.
//!
//! [`assemble`] turns a stored block into its effective bytes: the leading
//! partial record is dropped (it was shipped to the predecessor as a
//! supplement) and this block's own supplement is appended at the end.
//! [`parse_block`] then scans the effective bytes, splitting on the
//! attribute and line delimiters and feeding fields to a
//! [`RecordWriter`](crate::load::output::RecordWriter).

use crate::error::{Result, ShardlineError};
use crate::load::output::RecordWriter;

/// Builds the effective bytes of one block.
///
/// For `seq != 0` the bytes through the first line delimiter are dropped.
/// A non-empty non-first block without any delimiter is malformed; repair
/// raises this earlier, but the invariant is re-checked here.
pub fn assemble(
    payload: &[u8],
    supplement: Option<&[u8]>,
    seq: u64,
    line_delimiter: u8,
) -> Result<Vec<u8>> {
    let body = if seq != 0 && !payload.is_empty() {
        let delim = payload
            .iter()
            .position(|&b| b == line_delimiter)
            .ok_or_else(|| {
                ShardlineError::MalformedBlock(
                    "encountered a whole block without line delimiter characters; \
                     increase the block size"
                        .to_owned(),
                )
            })?;
        &payload[delim + 1..]
    } else {
        payload
    };
    let supplement = supplement.unwrap_or(&[]);
    let mut data = Vec::with_capacity(body.len() + supplement.len());
    data.extend_from_slice(body);
    data.extend_from_slice(supplement);
    Ok(data)
}

/// Parses the effective bytes of one block into records.
///
/// A field ends at the attribute delimiter, the line delimiter, or the end
/// of the data; a record ends at the line delimiter or the end of the
/// data. On a terminal block a single trailing line delimiter closes the
/// last record without emitting an empty one; everywhere else a delimiter
/// at the very end legitimately yields an empty record (an empty line).
///
/// Callers must skip terminal blocks of effective length <= 1 entirely;
/// those hold at most the file's closing delimiter.
pub fn parse_block(
    data: &[u8],
    is_terminal: bool,
    line_delimiter: u8,
    attribute_delimiter: u8,
    writer: &mut RecordWriter,
) -> Result<()> {
    let terminus = data.len();
    let mut start = 0;
    let mut end = 0;
    loop {
        while end != terminus
            && data[end] != attribute_delimiter
            && data[end] != line_delimiter
        {
            end += 1;
        }
        writer.write_field(&data[start..end]);
        if end == terminus || data[end] == line_delimiter {
            writer.end_record()?;
            if end == terminus || (is_terminal && end == terminus - 1) {
                return Ok(());
            }
        }
        end += 1;
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_first_block_keeps_everything() {
        let data = assemble(b"a,1\nb", None, 0, b'\n').unwrap();
        assert_eq!(data, b"a,1\nb");
    }

    #[test]
    fn test_assemble_strips_leading_partial_and_appends_supplement() {
        let data = assemble(b",2\nc,3\n", Some(b"tail"), 1, b'\n').unwrap();
        assert_eq!(data, b"c,3\ntail");
    }

    #[test]
    fn test_assemble_block_without_delimiter_is_malformed() {
        let result = assemble(b"no delimiter here", None, 3, b'\n');
        assert!(matches!(result, Err(ShardlineError::MalformedBlock(_))));
    }

    #[test]
    fn test_assemble_strip_can_consume_whole_block() {
        let data = assemble(b"rest of a record\n", Some(b""), 2, b'\n').unwrap();
        assert_eq!(data, b"");
    }
}
