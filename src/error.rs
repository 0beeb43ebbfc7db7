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

//! Shardline error types

use std::{
    error::Error,
    fmt::{Display, Formatter},
    io, result,
};

use arrow::error::ArrowError;

/// Result type alias for shardline operations.
pub type Result<T> = result::Result<T, ShardlineError>;

/// Error types for distributed load/save operations.
///
/// All variants except the per-record data errors (which are recorded in the
/// output's error column, not raised) are fatal: they abort the entire
/// distributed operation with no partial-success mode.
#[derive(Debug)]
pub enum ShardlineError {
    /// Invalid, duplicate, or missing configuration, detected before any I/O.
    Configuration(String),
    /// I/O operation error.
    IoError(io::Error),
    /// Error from Arrow operations.
    ArrowError(Box<ArrowError>),
    /// A block contains no line delimiter, so boundary repair cannot run.
    /// The documented remedy is a larger block size; there is no retry.
    MalformedBlock(String),
    /// A single assembled block produced more records than the configured
    /// chunk capacity. The remedy is a larger `chunk_size`.
    ChunkOverflow(String),
    /// The save-path result size cap was exceeded: (bytes written, cap).
    SizeLimitExceeded(u64, u64),
    /// A peer channel was closed while the exchange was still in progress.
    ChannelClosed(String),
    /// Internal error indicating a bug or unexpected state.
    Internal(String),
}

#[allow(clippy::from_over_into)]
impl<T> Into<Result<T>> for ShardlineError {
    fn into(self) -> Result<T> {
        Err(self)
    }
}

impl From<String> for ShardlineError {
    fn from(e: String) -> Self {
        ShardlineError::Internal(e)
    }
}

impl From<io::Error> for ShardlineError {
    fn from(e: io::Error) -> Self {
        ShardlineError::IoError(e)
    }
}

impl From<ArrowError> for ShardlineError {
    fn from(e: ArrowError) -> Self {
        ShardlineError::ArrowError(Box::new(e))
    }
}

impl Display for ShardlineError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ShardlineError::Configuration(desc) => {
                write!(f, "Configuration error: {desc}")
            }
            ShardlineError::IoError(desc) => write!(f, "IO error: {desc}"),
            ShardlineError::ArrowError(desc) => write!(f, "Arrow error: {desc}"),
            ShardlineError::MalformedBlock(desc) => {
                write!(f, "Malformed block: {desc}")
            }
            ShardlineError::ChunkOverflow(desc) => {
                write!(f, "Chunk overflow: {desc}")
            }
            ShardlineError::SizeLimitExceeded(written, cap) => {
                write!(
                    f,
                    "Size limit exceeded: wrote {written} bytes, cap is {cap} bytes"
                )
            }
            ShardlineError::ChannelClosed(desc) => {
                write!(f, "Channel closed: {desc}")
            }
            ShardlineError::Internal(desc) => {
                write!(f, "Internal shardline error: {desc}")
            }
        }
    }
}

impl Error for ShardlineError {}
