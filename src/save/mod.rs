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

//! The distributed save path.
//!
//! Each instance serializes its local record batches into chunks
//! ([`populator`]) and assigns every chunk a destination, round-robin over
//! the configured destination instances, offset by the producing instance
//! for an even spread. Chunks are redistributed by destination and each
//! destination writes its chunks in `(seq, src)` order to its configured
//! path ([`writer`]). When every instance holds at most one chunk and
//! exactly the saving instances hold one, the cluster agrees to skip
//! redistribution and the savers write their own chunk directly.

pub mod chunk;
pub mod cursor;
pub mod populator;
pub mod writer;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use log::{debug, info};

use crate::cluster::{all_agree, ClusterContext, InstanceId};
use crate::config::{SaveConfig, SaveFormat};
use crate::error::{Result, ShardlineError};
use crate::store::{ChunkCoord, StoreProvider};

pub use chunk::ChunkBuffer;
pub use cursor::ArrayCursor;
pub use populator::ChunkPopulator;
pub use writer::OutputFile;

const CHUNK_STORE: &str = "save.chunks";

/// What one instance did during a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Rows this instance serialized from its local batches.
    pub rows_serialized: u64,
    /// Chunks this instance wrote to its output file.
    pub chunks_written: u64,
    /// Bytes this instance wrote, header included.
    pub bytes_written: u64,
}

/// Drives the save on one instance. Every instance of the cluster must
/// call [`execute`](Self::execute) with the same configuration.
pub struct SaveExec {
    config: SaveConfig,
}

impl SaveExec {
    /// Creates the operator.
    pub fn new(config: SaveConfig) -> Self {
        Self { config }
    }

    /// Serializes `batches` and writes this instance's share of the
    /// cluster-wide output.
    pub fn execute(
        &self,
        ctx: &ClusterContext,
        stores: &dyn StoreProvider,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) -> Result<SaveSummary> {
        let me = ctx.instance_id();
        let instances = ctx.instances();
        for &dst in self.config.instance_map().keys() {
            if dst >= instances {
                return Err(ShardlineError::Configuration(format!(
                    "output instance {dst} out of range for a cluster of {instances}"
                )));
            }
        }
        let mut cursor = ArrayCursor::try_new(schema.clone(), batches)?;
        let populator = ChunkPopulator::try_new(self.config.format(), schema.as_ref())?;

        let destinations: Vec<InstanceId> =
            self.config.instance_map().keys().copied().collect();
        let mut dst_idx = me % destinations.len();
        let mut local: Vec<(ChunkCoord, Vec<u8>)> = Vec::new();
        let mut rows_serialized = 0u64;
        let mut seq = 0u64;
        while !cursor.is_end() {
            let mut buffer = ChunkBuffer::new();
            let rows = populator.populate(&mut buffer, &mut cursor, &self.config)?;
            if rows == 0 {
                break;
            }
            rows_serialized += rows;
            let coord = ChunkCoord {
                src: me,
                seq,
                dst: destinations[dst_idx],
            };
            dst_idx = (dst_idx + 1) % destinations.len();
            seq += 1;
            local.push((coord, buffer.take()));
        }
        debug!(
            "instance {me} serialized {rows_serialized} row(s) into {} chunk(s)",
            local.len()
        );

        let i_save = self.config.instance_map().contains_key(&me);
        let single = local.len() <= 1;
        let fast = all_agree(ctx, single && (i_save == !local.is_empty()))?;

        let to_write: Vec<Vec<u8>> = if fast {
            debug!("instance {me} taking the single-chunk fast path");
            local.into_iter().map(|(_, bytes)| bytes).collect()
        } else {
            let store = stores.create(CHUNK_STORE)?;
            for (coord, bytes) in local {
                store.put(coord, bytes)?;
            }
            store.redistribute()?;
            let mut coords = store.owned_coords(me);
            coords.sort_by_key(|c| (c.seq, c.src));
            let mut chunks = Vec::with_capacity(coords.len());
            for coord in coords {
                chunks.push(store.get(&coord)?.ok_or_else(|| {
                    ShardlineError::Internal(format!("owned chunk {coord:?} is missing"))
                })?);
            }
            chunks
        };

        if !i_save {
            return Ok(SaveSummary {
                rows_serialized,
                ..SaveSummary::default()
            });
        }
        let path = &self.config.instance_map()[&me];
        let mut out = OutputFile::create(
            path,
            self.config.append(),
            self.config.max_result_bytes(),
        )?;
        if self.config.format() == SaveFormat::Text && self.config.print_header() {
            out.write_chunk(&self.header_line(schema.as_ref()))?;
        }
        let chunks_written = to_write.len() as u64;
        match self.config.format() {
            SaveFormat::Text | SaveFormat::Binary => {
                for bytes in &to_write {
                    out.write_chunk(bytes)?;
                }
            }
            SaveFormat::Arrow => {
                write_arrow_file(&mut out, schema.as_ref(), &to_write)?;
            }
        }
        let bytes_written = out.finish()?;
        info!(
            "instance {me} wrote {chunks_written} chunk(s), {bytes_written} byte(s) to {}",
            path.display()
        );
        Ok(SaveSummary {
            rows_serialized,
            chunks_written,
            bytes_written,
        })
    }

    // Raw bytes, not a String: the delimiters are arbitrary u8 values.
    fn header_line(&self, schema: &Schema) -> Vec<u8> {
        let mut header = Vec::new();
        for (i, field) in schema.fields().iter().enumerate() {
            if i > 0 {
                header.push(self.config.attribute_delimiter());
            }
            header.extend_from_slice(field.name().as_bytes());
        }
        header.push(self.config.line_delimiter());
        header
    }
}

/// Re-reads the per-chunk IPC streams and writes their batches as one
/// file-level stream, so the output file is a single valid Arrow stream.
fn write_arrow_file(
    out: &mut OutputFile,
    schema: &Schema,
    chunks: &[Vec<u8>],
) -> Result<()> {
    let mut batches = Vec::new();
    for bytes in chunks {
        let reader = StreamReader::try_new(bytes.as_slice(), None)?;
        for batch in reader {
            batches.push(batch?);
        }
    }
    if batches.is_empty() {
        return Ok(());
    }
    let mut merged = ChunkBuffer::new();
    let mut writer = StreamWriter::try_new(&mut merged, schema)?;
    for batch in &batches {
        writer.write(batch)?;
    }
    writer.finish()?;
    drop(writer);
    out.write_chunk(merged.as_slice())
}
