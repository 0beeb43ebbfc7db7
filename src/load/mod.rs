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

//! The distributed load path.
//!
//! Phases, each a collective across the cluster:
//!
//! 1. every reading instance splits its file into fixed blocks and puts
//!    them in the block store under `(src, seq)` coordinates;
//! 2. blocks are redistributed to their deterministic owners;
//! 3. boundary repair ([`repair`]) ships supplement fragments to
//!    predecessor coordinates and agrees on each source's last sequence;
//! 4. every instance assembles and parses its owned blocks in
//!    `(src, seq)` order into record batches ([`assembler`], [`output`]).
//!
//! Every logical line of the input appears in exactly one output chunk,
//! and within each source in file order.

pub mod assembler;
pub mod block_reader;
pub mod output;
pub mod repair;

use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use log::{debug, info};

use crate::cluster::ClusterContext;
use crate::codec::{decode_block, encode_block};
use crate::config::LoadConfig;
use crate::error::{Result, ShardlineError};
use crate::store::{ChunkCoord, StoreProvider};

pub use block_reader::{Block, FixedBlockReader, LineBlockReader};
pub use output::{output_schema, RecordWriter};

const BLOCK_STORE: &str = "load.blocks";
const SUPPLEMENT_STORE: &str = "load.supplements";

/// One output chunk of the load, tagged with the block it came from.
#[derive(Debug, Clone)]
pub struct LoadedChunk {
    /// Coordinate of the assembled block.
    pub coord: ChunkCoord,
    /// The parsed records.
    pub batch: RecordBatch,
}

/// Drives the load on one instance. Every instance of the cluster must
/// call [`execute`](Self::execute) with the same configuration.
pub struct LoadExec {
    config: LoadConfig,
}

impl LoadExec {
    /// Creates the operator.
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Schema of every batch this operator produces.
    pub fn schema(&self) -> SchemaRef {
        output_schema(
            self.config.num_attributes(),
            self.config.split_on_dimension(),
        )
    }

    /// Runs the load and returns this instance's chunks in
    /// `(src, seq)` order.
    pub fn execute(
        &self,
        ctx: &ClusterContext,
        stores: &dyn StoreProvider,
    ) -> Result<Vec<LoadedChunk>> {
        let instances = ctx.instances();
        let me = ctx.instance_id();
        if self.config.max_source_instance() >= instances {
            return Err(ShardlineError::Configuration(format!(
                "input instance {} out of range for a cluster of {instances}",
                self.config.max_source_instance()
            )));
        }
        let blocks = stores.create(BLOCK_STORE)?;
        let supplements = stores.create(SUPPLEMENT_STORE)?;

        if let Some(path) = self.config.reader_path(me) {
            info!("instance {me} loading {}", path.display());
            let mut reader = FixedBlockReader::open(
                path,
                self.config.block_size(),
                self.config.header(),
                self.config.line_delimiter(),
            )?;
            let mut seq = 0u64;
            while let Some(block) = reader.next_block()? {
                let framed = encode_block(&block.data, block.is_final)?;
                blocks.put(ChunkCoord::block(me, seq, instances), framed)?;
                seq += 1;
            }
            debug!("instance {me} produced {seq} block(s)");
        }
        blocks.redistribute()?;

        let last_seq = repair::repair_boundaries(
            ctx,
            &*blocks,
            &*supplements,
            self.config.line_delimiter(),
        )?;

        let mut writer = RecordWriter::new(
            self.config.num_attributes(),
            self.config.attribute_delimiter(),
            self.config.chunk_size(),
            self.config.split_on_dimension(),
        );
        let mut chunks = Vec::new();
        for coord in blocks.owned_coords(me) {
            let framed = blocks.get(&coord)?.ok_or_else(|| {
                ShardlineError::Internal(format!("owned block {coord:?} is missing"))
            })?;
            let frame = decode_block(&framed)?;
            let supplement = supplements.get(&coord)?;
            let data = assembler::assemble(
                frame.payload,
                supplement.as_deref(),
                coord.seq,
                self.config.line_delimiter(),
            )?;
            let seq = i64::try_from(coord.seq).map_err(|_| {
                ShardlineError::Internal(format!(
                    "block sequence {} overflows",
                    coord.seq
                ))
            })?;
            let is_terminal = last_seq[coord.src] == seq;
            if is_terminal && data.len() <= 1 {
                continue;
            }
            assembler::parse_block(
                &data,
                is_terminal,
                self.config.line_delimiter(),
                self.config.attribute_delimiter(),
                &mut writer,
            )?;
            if let Some(batch) = writer.finish_chunk()? {
                chunks.push(LoadedChunk { coord, batch });
            }
        }
        info!("instance {me} assembled {} chunk(s)", chunks.len());
        Ok(chunks)
    }
}

/// Splits a local file into blocks of at most `lines_per_block` complete
/// lines, never cutting mid-line. Single-instance; no repair needed.
pub fn split_local(
    path: &Path,
    lines_per_block: u64,
    line_delimiter: u8,
) -> Result<Vec<Vec<u8>>> {
    let mut reader = LineBlockReader::open(path, lines_per_block, line_delimiter)?;
    let mut out = Vec::new();
    while let Some(block) = reader.next_block()? {
        out.push(block);
    }
    Ok(out)
}
