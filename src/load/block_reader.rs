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

//! Splits an input file into blocks.
//!
//! [`FixedBlockReader`] cuts blind fixed-size byte blocks with no regard
//! for record boundaries; boundary repair puts the records back together.
//! [`LineBlockReader`] cuts on line boundaries instead, bounded by a line
//! count per block, and needs no repair at the price of unbounded
//! per-block memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::debug;

use crate::error::Result;

/// One block read from the input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Raw bytes, possibly starting or ending mid-record.
    pub data: Vec<u8>,
    /// Whether the read that produced this block hit end of file.
    pub is_final: bool,
}

/// Reads a file as a sequence of fixed-size byte blocks.
///
/// Only the last block may be shorter than `block_size`, and only that
/// short read sets `is_final`. A file whose length is an exact multiple of
/// the block size ends with a full, unflagged block.
pub struct FixedBlockReader<R> {
    inner: R,
    block_size: usize,
    done: bool,
}

impl FixedBlockReader<BufReader<File>> {
    /// Opens `path` and positions the reader past `header` lines
    /// terminated by `line_delimiter`. A file with fewer lines than the
    /// header is not an error; it simply yields no blocks.
    pub fn open(
        path: &Path,
        block_size: usize,
        header: u64,
        line_delimiter: u8,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = Self::new(BufReader::new(file), block_size);
        let skipped = reader.skip_lines(header, line_delimiter)?;
        debug!(
            "opened {} with block size {block_size}, skipped {skipped} header line(s)",
            path.display()
        );
        Ok(reader)
    }
}

impl<R: BufRead> FixedBlockReader<R> {
    /// Wraps an already-open reader.
    pub fn new(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            block_size,
            done: false,
        }
    }

    fn skip_lines(&mut self, lines: u64, delimiter: u8) -> Result<u64> {
        let mut scratch = Vec::new();
        for skipped in 0..lines {
            scratch.clear();
            if self.inner.read_until(delimiter, &mut scratch)? == 0 {
                self.done = true;
                return Ok(skipped);
            }
        }
        Ok(lines)
    }

    /// Reads the next block, or `None` at end of file.
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        let mut data = vec![0u8; self.block_size];
        let mut filled = 0;
        while filled < self.block_size {
            let n = self.inner.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            self.done = true;
            return Ok(None);
        }
        let is_final = filled < self.block_size;
        if is_final {
            self.done = true;
            data.truncate(filled);
        }
        Ok(Some(Block { data, is_final }))
    }
}

/// Reads a file as blocks of at most `lines_per_block` complete lines.
///
/// Grows an internal buffer geometrically until it holds enough whole
/// lines, then compacts the unconsumed tail to the front. Every block but
/// possibly the last ends with the line delimiter.
pub struct LineBlockReader<R> {
    inner: R,
    lines_per_block: u64,
    delimiter: u8,
    buf: Vec<u8>,
    len: usize,
    eof: bool,
}

const LINE_READER_INITIAL_CAPACITY: usize = 64 * 1024;

impl LineBlockReader<BufReader<File>> {
    /// Opens `path` for line-bounded splitting.
    pub fn open(path: &Path, lines_per_block: u64, delimiter: u8) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), lines_per_block, delimiter))
    }
}

impl<R: Read> LineBlockReader<R> {
    /// Wraps an already-open reader.
    pub fn new(inner: R, lines_per_block: u64, delimiter: u8) -> Self {
        Self {
            inner,
            lines_per_block: lines_per_block.max(1),
            delimiter,
            buf: vec![0u8; LINE_READER_INITIAL_CAPACITY],
            len: 0,
            eof: false,
        }
    }

    /// Reads the next block, or `None` at end of file.
    pub fn next_block(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(cut) = self.find_cut() {
                let block = self.buf[..cut].to_vec();
                self.buf.copy_within(cut..self.len, 0);
                self.len -= cut;
                return Ok(Some(block));
            }
            if self.eof {
                if self.len == 0 {
                    return Ok(None);
                }
                let block = self.buf[..self.len].to_vec();
                self.len = 0;
                return Ok(Some(block));
            }
            if self.len == self.buf.len() {
                self.buf.resize(self.buf.len() * 2, 0);
            }
            let n = self.inner.read(&mut self.buf[self.len..])?;
            if n == 0 {
                self.eof = true;
            }
            self.len += n;
        }
    }

    /// Position one past the `lines_per_block`-th delimiter, if the buffer
    /// holds that many complete lines.
    fn find_cut(&self) -> Option<usize> {
        let mut lines = 0u64;
        for (i, &b) in self.buf[..self.len].iter().enumerate() {
            if b == self.delimiter {
                lines += 1;
                if lines == self.lines_per_block {
                    return Some(i + 1);
                }
            }
        }
        None
    }
}
