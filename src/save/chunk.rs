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

//! Growable byte buffer for one serialized chunk.

use std::io;
use std::mem;

const INITIAL_CAPACITY: usize = 4096;

/// Accumulates the serialized bytes of one chunk, doubling its capacity
/// whenever a write would not fit.
///
/// Implements `io::Write` so Arrow IPC writers can target it directly.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    data: Vec<u8>,
}

impl ChunkBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Appends `bytes`, growing geometrically as needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Appends a single byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.ensure(1);
        self.data.push(byte);
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The accumulated bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Takes the accumulated bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        mem::take(&mut self.data)
    }

    fn ensure(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let mut capacity = self.data.capacity().max(INITIAL_CAPACITY);
        while capacity < needed {
            capacity *= 2;
        }
        self.data.reserve_exact(capacity - self.data.len());
    }
}

impl io::Write for ChunkBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_writes() {
        let mut buf = ChunkBuffer::new();
        buf.write_bytes(b"abc");
        buf.write_byte(b'd');
        assert_eq!(buf.as_slice(), b"abcd");
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut buf = ChunkBuffer::with_capacity(4);
        let payload = vec![7u8; INITIAL_CAPACITY * 3];
        buf.write_bytes(&payload);
        assert_eq!(buf.len(), payload.len());
        assert!(buf.as_slice().iter().all(|&b| b == 7));
    }

    #[test]
    fn test_take_resets() {
        let mut buf = ChunkBuffer::new();
        buf.write_bytes(b"xy");
        assert_eq!(buf.take(), b"xy");
        assert!(buf.is_empty());
    }
}
