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

//! Shared harness: runs a cluster of instances on threads of one process.

use std::sync::Arc;
use std::thread;

use arrow::array::{Array, StringArray};
use shardline::cluster::{ClusterContext, LocalChannelGrid, MessageChannel};
use shardline::load::LoadedChunk;
use shardline::store::InMemoryStoreHub;

/// Runs `f` once per instance, each on its own thread, sharing one channel
/// grid and one store hub. Returns the per-instance results in id order.
pub fn run_cluster<F, T>(instances: usize, f: F) -> Vec<T>
where
    F: Fn(ClusterContext, Arc<InMemoryStoreHub>) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let channel: Arc<dyn MessageChannel> = Arc::new(LocalChannelGrid::new(instances));
    let hub = Arc::new(InMemoryStoreHub::new(instances));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..instances)
        .map(|id| {
            let channel = channel.clone();
            let hub = hub.clone();
            let f = f.clone();
            thread::spawn(move || {
                let ctx = ClusterContext::try_new(id, instances, channel).unwrap();
                f(ctx, hub)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

/// Flattens load output into rows of string columns, cluster-wide, in
/// `(src, seq)` order. Each row holds every column of the load schema,
/// the error column last.
pub fn collect_rows(per_instance: Vec<Vec<LoadedChunk>>) -> Vec<Vec<Option<String>>> {
    let mut chunks: Vec<LoadedChunk> = per_instance.into_iter().flatten().collect();
    chunks.sort_by_key(|c| (c.coord.src, c.coord.seq));
    let mut rows = Vec::new();
    for chunk in chunks {
        let columns: Vec<&StringArray> = chunk
            .batch
            .columns()
            .iter()
            .map(|c| c.as_any().downcast_ref::<StringArray>().unwrap())
            .collect();
        for row in 0..chunk.batch.num_rows() {
            rows.push(
                columns
                    .iter()
                    .map(|col| {
                        if col.is_null(row) {
                            None
                        } else {
                            Some(col.value(row).to_owned())
                        }
                    })
                    .collect(),
            );
        }
    }
    rows
}

/// The rows the load must produce for `content` parsed with
/// `num_attributes` attributes split on `attribute_delimiter`, per the
/// field-count policy (nulls plus `short`, or folded overflow with
/// `long`).
pub fn expected_rows(
    content: &str,
    num_attributes: usize,
    attribute_delimiter: char,
) -> Vec<Vec<Option<String>>> {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if content.ends_with('\n') {
        lines.pop();
    }
    lines
        .iter()
        .map(|line| {
            let fields: Vec<&str> = line.split(attribute_delimiter).collect();
            let mut row: Vec<Option<String>> = Vec::with_capacity(num_attributes + 1);
            for i in 0..num_attributes {
                row.push(fields.get(i).map(|f| (*f).to_owned()));
            }
            let error = if fields.len() > num_attributes {
                let mut e = "long".to_owned();
                for f in &fields[num_attributes..] {
                    e.push(attribute_delimiter);
                    e.push_str(f);
                }
                Some(e)
            } else if fields.len() < num_attributes {
                Some("short".to_owned())
            } else {
                None
            };
            row.push(error);
            row
        })
        .collect()
}
