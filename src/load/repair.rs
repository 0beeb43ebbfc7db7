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

//! Boundary repair: supplement extraction and last-block agreement.
//!
//! A fixed-size block split puts the head of most blocks in the middle of
//! a record. The leading bytes of block `(src, seq)` up to its first line
//! delimiter complete the last record of block `(src, seq - 1)`, so every
//! owner ships that fragment (the supplement) to the predecessor's
//! coordinate. The owners also agree on each source's last block sequence
//! number, which the assembler needs to tell a mid-file block from the end
//! of a file.

use log::debug;

use crate::cluster::{all_reduce_max, ClusterContext};
use crate::codec::decode_block;
use crate::error::{Result, ShardlineError};
use crate::store::DistributedStore;

/// Runs boundary repair over this instance's owned blocks.
///
/// Extracts a supplement from every owned block with `seq != 0`, stores it
/// at the predecessor coordinate, reduces the last-sequence vector across
/// the cluster, and redistributes the supplements. Collective: every
/// instance must call it exactly once.
///
/// Returns the agreed last-sequence vector, indexed by source instance,
/// `-1` for sources that produced no blocks.
pub fn repair_boundaries(
    ctx: &ClusterContext,
    blocks: &dyn DistributedStore,
    supplements: &dyn DistributedStore,
    line_delimiter: u8,
) -> Result<Vec<i64>> {
    let instances = ctx.instances();
    let mut last_seq = vec![-1i64; instances];
    let owned = blocks.owned_coords(ctx.instance_id());
    debug!(
        "instance {} repairing boundaries of {} owned block(s)",
        ctx.instance_id(),
        owned.len()
    );
    for coord in owned {
        let seq = i64::try_from(coord.seq).map_err(|_| {
            ShardlineError::Internal(format!("block sequence {} overflows", coord.seq))
        })?;
        if last_seq[coord.src] < seq {
            last_seq[coord.src] = seq;
        }
        let predecessor = match coord.predecessor(instances) {
            Some(p) => p,
            None => continue,
        };
        let framed = blocks.get(&coord)?.ok_or_else(|| {
            ShardlineError::Internal(format!("owned block {coord:?} is missing"))
        })?;
        let frame = decode_block(&framed)?;
        if frame.payload.is_empty() {
            continue;
        }
        let delim = frame
            .payload
            .iter()
            .position(|&b| b == line_delimiter)
            .ok_or_else(|| {
                ShardlineError::MalformedBlock(
                    "encountered a whole block without line delimiter characters; \
                     increase the block size"
                        .to_owned(),
                )
            })?;
        supplements.put(predecessor, frame.payload[..delim].to_vec())?;
    }
    all_reduce_max(ctx, &mut last_seq)?;
    supplements.redistribute()?;
    Ok(last_seq)
}
