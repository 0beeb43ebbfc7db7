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

//! In-process store implementation shared by threads hosting instances.

use std::sync::{Arc, Barrier};

use dashmap::DashMap;

use crate::cluster::InstanceId;
use crate::error::{Result, ShardlineError};
use crate::store::{ChunkCoord, DistributedStore, StoreProvider};

/// In-memory [`StoreProvider`] for a cluster of instances hosted on
/// threads of one process.
///
/// Every instance must use the same hub; `create` hands out one shared
/// store per name, and each store's `redistribute` is a `std::sync`
/// barrier sized to the cluster.
pub struct InMemoryStoreHub {
    instances: usize,
    stores: DashMap<String, Arc<InMemoryStore>>,
}

impl InMemoryStoreHub {
    /// Creates a hub for a cluster of `instances` members.
    pub fn new(instances: usize) -> Self {
        Self {
            instances,
            stores: DashMap::new(),
        }
    }
}

impl StoreProvider for InMemoryStoreHub {
    fn create(&self, name: &str) -> Result<Arc<dyn DistributedStore>> {
        let store = self
            .stores
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(InMemoryStore::new(self.instances)))
            .clone();
        Ok(store)
    }
}

struct InMemoryStore {
    chunks: DashMap<ChunkCoord, Vec<u8>>,
    barrier: Barrier,
}

impl InMemoryStore {
    fn new(instances: usize) -> Self {
        Self {
            chunks: DashMap::new(),
            barrier: Barrier::new(instances),
        }
    }
}

impl DistributedStore for InMemoryStore {
    fn put(&self, coord: ChunkCoord, bytes: Vec<u8>) -> Result<()> {
        if self.chunks.insert(coord, bytes).is_some() {
            return Err(ShardlineError::Internal(format!(
                "chunk {coord:?} was stored twice"
            )));
        }
        Ok(())
    }

    fn redistribute(&self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }

    fn get(&self, coord: &ChunkCoord) -> Result<Option<Vec<u8>>> {
        Ok(self.chunks.get(coord).map(|entry| entry.value().clone()))
    }

    fn owned_coords(&self, instance: InstanceId) -> Vec<ChunkCoord> {
        let mut coords: Vec<ChunkCoord> = self
            .chunks
            .iter()
            .map(|entry| *entry.key())
            .filter(|coord| coord.dst == instance)
            .collect();
        coords.sort();
        coords
    }
}
