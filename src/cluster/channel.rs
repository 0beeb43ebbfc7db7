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

//! The point-to-point transport seam.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::cluster::InstanceId;
use crate::error::{Result, ShardlineError};

/// Blocking point-to-point byte transport between instances.
///
/// Messages between any ordered pair `(from, to)` are delivered in send
/// order. `recv` blocks until a message from the named sender arrives.
/// Implementations must be safe to share across the threads hosting the
/// instances.
pub trait MessageChannel: Send + Sync {
    /// Delivers `payload` from instance `from` to instance `to`.
    fn send(&self, from: InstanceId, to: InstanceId, payload: Vec<u8>) -> Result<()>;

    /// Receives the next payload sent by `from` to `to`, blocking until one
    /// is available.
    fn recv(&self, to: InstanceId, from: InstanceId) -> Result<Vec<u8>>;
}

/// In-process [`MessageChannel`] backed by an `n x n` grid of unbounded
/// crossbeam channels, one per ordered instance pair.
///
/// Unbounded queues keep the collectives deadlock-free: an instance can
/// finish all of its sends before any peer starts receiving.
pub struct LocalChannelGrid {
    instances: usize,
    senders: Vec<Sender<Vec<u8>>>,
    receivers: Vec<Receiver<Vec<u8>>>,
}

impl LocalChannelGrid {
    /// Creates a grid for a cluster of `instances` members.
    pub fn new(instances: usize) -> Self {
        let mut senders = Vec::with_capacity(instances * instances);
        let mut receivers = Vec::with_capacity(instances * instances);
        for _ in 0..instances * instances {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(rx);
        }
        Self {
            instances,
            senders,
            receivers,
        }
    }

    fn index(&self, from: InstanceId, to: InstanceId) -> Result<usize> {
        if from >= self.instances || to >= self.instances {
            return Err(ShardlineError::Internal(format!(
                "instance pair ({from}, {to}) out of range for a cluster of {}",
                self.instances
            )));
        }
        Ok(from * self.instances + to)
    }
}

impl MessageChannel for LocalChannelGrid {
    fn send(&self, from: InstanceId, to: InstanceId, payload: Vec<u8>) -> Result<()> {
        let idx = self.index(from, to)?;
        self.senders[idx].send(payload).map_err(|_| {
            ShardlineError::ChannelClosed(format!(
                "send from instance {from} to instance {to} failed"
            ))
        })
    }

    fn recv(&self, to: InstanceId, from: InstanceId) -> Result<Vec<u8>> {
        let idx = self.index(from, to)?;
        self.receivers[idx].recv().map_err(|_| {
            ShardlineError::ChannelClosed(format!(
                "receive on instance {to} from instance {from} failed"
            ))
        })
    }
}
