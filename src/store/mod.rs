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

//! Coordinate-addressed chunk storage with barrier-style redistribution.
//!
//! A [`DistributedStore`] is the shuffle surface between instances: each
//! instance `put`s chunks under [`ChunkCoord`] keys, all instances call
//! `redistribute` (a barrier), and afterwards every instance can read the
//! chunks destined for it. The host engine supplies the implementation;
//! [`memory::InMemoryStoreHub`] is the in-process one used by the tests.

pub mod memory;

use std::sync::Arc;

use crate::cluster::InstanceId;
use crate::error::Result;

pub use memory::InMemoryStoreHub;

/// Identity and placement of one stored chunk.
///
/// `src` and `seq` identify the chunk (which producer, which position in
/// that producer's sequence); `dst` names the instance that owns it after
/// redistribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// Producing instance.
    pub src: InstanceId,
    /// Position in the producer's sequence, from 0.
    pub seq: u64,
    /// Owning instance after redistribution.
    pub dst: InstanceId,
}

impl ChunkCoord {
    /// Coordinate of block `seq` read by `src`, with the deterministic
    /// owner `(src + seq) % instances`.
    pub fn block(src: InstanceId, seq: u64, instances: usize) -> Self {
        let dst = (src + (seq % instances as u64) as usize) % instances;
        Self { src, seq, dst }
    }

    /// Coordinate of the block immediately before this one in the same
    /// file, or `None` for the first block.
    pub fn predecessor(&self, instances: usize) -> Option<Self> {
        self.seq
            .checked_sub(1)
            .map(|seq| Self::block(self.src, seq, instances))
    }
}

/// One named, cluster-wide chunk store.
///
/// `put` is write-once per coordinate. `redistribute` is a collective: it
/// returns only after every instance has called it, and from then on `get`
/// and `owned_coords` see every chunk put by any instance.
pub trait DistributedStore: Send + Sync {
    /// Stores `bytes` under `coord`. Writing the same coordinate twice is
    /// an error.
    fn put(&self, coord: ChunkCoord, bytes: Vec<u8>) -> Result<()>;

    /// Barrier: blocks until all instances have called it, making every
    /// stored chunk visible everywhere.
    fn redistribute(&self) -> Result<()>;

    /// Reads the chunk stored under `coord`, if any.
    fn get(&self, coord: &ChunkCoord) -> Result<Option<Vec<u8>>>;

    /// All coordinates whose `dst` is `instance`, sorted by `(src, seq)`.
    fn owned_coords(&self, instance: InstanceId) -> Vec<ChunkCoord>;
}

/// Creates named stores on demand. Two instances asking for the same name
/// get handles to the same cluster-wide store.
pub trait StoreProvider: Send + Sync {
    /// Returns the store named `name`, creating it on first use.
    fn create(&self, name: &str) -> Result<Arc<dyn DistributedStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_owner_rotates() {
        assert_eq!(ChunkCoord::block(0, 0, 3).dst, 0);
        assert_eq!(ChunkCoord::block(0, 1, 3).dst, 1);
        assert_eq!(ChunkCoord::block(0, 2, 3).dst, 2);
        assert_eq!(ChunkCoord::block(0, 3, 3).dst, 0);
        assert_eq!(ChunkCoord::block(2, 1, 3).dst, 0);
    }

    #[test]
    fn test_predecessor() {
        let c = ChunkCoord::block(1, 2, 3);
        let p = c.predecessor(3).unwrap();
        assert_eq!(p, ChunkCoord::block(1, 1, 3));
        assert!(ChunkCoord::block(1, 0, 3).predecessor(3).is_none());
    }

    #[test]
    fn test_coord_order_is_src_then_seq() {
        let mut coords = vec![
            ChunkCoord::block(1, 0, 2),
            ChunkCoord::block(0, 1, 2),
            ChunkCoord::block(0, 0, 2),
            ChunkCoord::block(1, 2, 2),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                ChunkCoord::block(0, 0, 2),
                ChunkCoord::block(0, 1, 2),
                ChunkCoord::block(1, 0, 2),
                ChunkCoord::block(1, 2, 2),
            ]
        );
    }
}
