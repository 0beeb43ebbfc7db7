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

//! Small all-to-all collectives over the point-to-point channel.
//!
//! Both collectives are the all-pairs exchange: every instance sends its
//! local value to every peer, then receives from every peer and folds.
//! O(N^2) messages, which is fine at the cluster sizes this crate targets.
//! All instances must call the same collective the same number of times in
//! the same order; the channel's per-pair ordering does the rest.

use crate::cluster::ClusterContext;
use crate::error::{Result, ShardlineError};

/// Element-wise maximum of `values` across all instances.
///
/// Every instance must pass a slice of the same length. On return `values`
/// holds, at each position, the largest value any instance contributed.
pub fn all_reduce_max(ctx: &ClusterContext, values: &mut [i64]) -> Result<()> {
    let encoded = encode_i64s(values);
    for peer in 0..ctx.instances() {
        if peer != ctx.instance_id() {
            ctx.send_to(peer, encoded.clone())?;
        }
    }
    for peer in 0..ctx.instances() {
        if peer == ctx.instance_id() {
            continue;
        }
        let payload = ctx.recv_from(peer)?;
        let remote = decode_i64s(&payload, values.len())?;
        for (v, r) in values.iter_mut().zip(remote) {
            *v = (*v).max(r);
        }
    }
    Ok(())
}

/// Logical AND of `value` across all instances.
pub fn all_agree(ctx: &ClusterContext, value: bool) -> Result<bool> {
    for peer in 0..ctx.instances() {
        if peer != ctx.instance_id() {
            ctx.send_to(peer, vec![u8::from(value)])?;
        }
    }
    let mut agreed = value;
    for peer in 0..ctx.instances() {
        if peer == ctx.instance_id() {
            continue;
        }
        let payload = ctx.recv_from(peer)?;
        match payload.as_slice() {
            [0] => agreed = false,
            [1] => {}
            other => {
                return Err(ShardlineError::Internal(format!(
                    "bad agreement payload of {} bytes from instance {peer}",
                    other.len()
                )))
            }
        }
    }
    Ok(agreed)
}

fn encode_i64s(values: &[i64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 8);
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_i64s(buf: &[u8], expected: usize) -> Result<Vec<i64>> {
    if buf.len() != expected * 8 {
        return Err(ShardlineError::Internal(format!(
            "reduce payload of {} bytes, expected {}",
            buf.len(),
            expected * 8
        )));
    }
    Ok(buf
        .chunks_exact(8)
        .map(|c| {
            i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
        })
        .collect())
}
