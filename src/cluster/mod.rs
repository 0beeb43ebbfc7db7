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

//! Cluster membership and peer communication.
//!
//! Each participating instance holds a [`ClusterContext`]: its own id, the
//! fixed cluster size, and a handle to the point-to-point
//! [`MessageChannel`]. The context is cheap to clone and is threaded
//! through every distributed operation.

pub mod channel;
pub mod collective;

use std::sync::Arc;

use crate::error::{Result, ShardlineError};

pub use channel::{LocalChannelGrid, MessageChannel};
pub use collective::{all_agree, all_reduce_max};

/// Identifies one instance in the cluster. Ids are dense: `0..instances`.
pub type InstanceId = usize;

/// One instance's view of the cluster.
#[derive(Clone)]
pub struct ClusterContext {
    instance_id: InstanceId,
    instances: usize,
    channel: Arc<dyn MessageChannel>,
}

impl ClusterContext {
    /// Creates a context for instance `instance_id` of a cluster of
    /// `instances` members communicating over `channel`.
    pub fn try_new(
        instance_id: InstanceId,
        instances: usize,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self> {
        if instances == 0 {
            return Err(ShardlineError::Configuration(
                "cluster must have at least one instance".to_owned(),
            ));
        }
        if instance_id >= instances {
            return Err(ShardlineError::Configuration(format!(
                "instance id {instance_id} out of range for a cluster of {instances}"
            )));
        }
        Ok(Self {
            instance_id,
            instances,
            channel,
        })
    }

    /// This instance's id.
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Total number of instances in the cluster.
    pub fn instances(&self) -> usize {
        self.instances
    }

    /// Sends `payload` to `to`. Self-sends are allowed and loop back.
    pub fn send_to(&self, to: InstanceId, payload: Vec<u8>) -> Result<()> {
        self.channel.send(self.instance_id, to, payload)
    }

    /// Receives the next message sent by `from` to this instance. Blocks.
    pub fn recv_from(&self, from: InstanceId) -> Result<Vec<u8>> {
        self.channel.recv(self.instance_id, from)
    }
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("instance_id", &self.instance_id)
            .field("instances", &self.instances)
            .finish()
    }
}
