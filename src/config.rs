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

//! Immutable, eagerly-validated configuration for the load and save paths.
//!
//! Every constraint is checked at construction time so that configuration
//! errors surface before any file or channel I/O. Components receive a
//! reference to the finished value; nothing reads ambient settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cluster::InstanceId;
use crate::error::{Result, ShardlineError};

/// Default block size for the load path, in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024 * 1024;
/// Default number of records per output chunk on the load path.
pub const DEFAULT_CHUNK_SIZE: u64 = 1_000_000;
/// Default number of cells per serialized chunk on the save path.
pub const DEFAULT_CELLS_PER_CHUNK: u64 = 1_000_000;
/// Default byte threshold for sealing a save-path chunk when no cell
/// threshold is configured.
pub const DEFAULT_SAVE_BUFFER_SIZE: usize = 8 * 1024 * 1024;

const MIB: u64 = 1024 * 1024;

/// Where the load path finds its input file(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// One file, read by exactly one designated instance.
    Single {
        /// Path to the input file.
        path: PathBuf,
        /// Instance that opens the file.
        instance: InstanceId,
    },
    /// One file per listed instance; every listed instance reads its own
    /// shard independently.
    PerInstance(Vec<(InstanceId, PathBuf)>),
}

/// Validated configuration for the load path.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    source: LoadSource,
    block_size: usize,
    header: u64,
    line_delimiter: u8,
    attribute_delimiter: u8,
    num_attributes: usize,
    chunk_size: u64,
    split_on_dimension: bool,
}

impl LoadConfig {
    /// Creates a load configuration with defaults for everything except the
    /// input source and the attribute count (both mandatory).
    pub fn try_new(source: LoadSource, num_attributes: usize) -> Result<Self> {
        if num_attributes == 0 {
            return Err(ShardlineError::Configuration(
                "num_attributes must be positive".to_owned(),
            ));
        }
        if let LoadSource::PerInstance(paths) = &source {
            if paths.is_empty() {
                return Err(ShardlineError::Configuration(
                    "no input file path was provided".to_owned(),
                ));
            }
            let mut instances: Vec<InstanceId> = paths.iter().map(|(i, _)| *i).collect();
            instances.sort_unstable();
            instances.dedup();
            if instances.len() != paths.len() {
                return Err(ShardlineError::Configuration(
                    "input instances were not unique".to_owned(),
                ));
            }
        }
        Ok(Self {
            source,
            block_size: DEFAULT_BLOCK_SIZE,
            header: 0,
            line_delimiter: b'\n',
            attribute_delimiter: b'\t',
            num_attributes,
            chunk_size: DEFAULT_CHUNK_SIZE,
            split_on_dimension: false,
        })
    }

    /// Sets the block size in bytes. Must be more than 8 bytes and under 1 GiB.
    pub fn with_block_size(mut self, block_size: usize) -> Result<Self> {
        if block_size <= 8 {
            return Err(ShardlineError::Configuration(
                "block_size must be greater than 8".to_owned(),
            ));
        }
        if block_size >= 1024 * 1024 * 1024 {
            return Err(ShardlineError::Configuration(
                "block_size must be under 1GiB".to_owned(),
            ));
        }
        self.block_size = block_size;
        Ok(self)
    }

    /// Sets the number of delimiter-terminated header lines to skip before
    /// the first data block.
    pub fn with_header(mut self, header: u64) -> Self {
        self.header = header;
        self
    }

    /// Sets the line delimiter byte (default `\n`).
    pub fn with_line_delimiter(mut self, delimiter: u8) -> Self {
        self.line_delimiter = delimiter;
        self
    }

    /// Sets the attribute delimiter byte (default `\t`).
    pub fn with_attribute_delimiter(mut self, delimiter: u8) -> Self {
        self.attribute_delimiter = delimiter;
        self
    }

    /// Sets the output chunk capacity in records.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ShardlineError::Configuration(
                "chunk_size must be positive".to_owned(),
            ));
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Places every field value along an extra dimension instead of one
    /// column per attribute; the error marker occupies index 0.
    pub fn with_split_on_dimension(mut self, split: bool) -> Self {
        self.split_on_dimension = split;
        self
    }

    /// The input source.
    pub fn source(&self) -> &LoadSource {
        &self.source
    }

    /// Returns the path this instance reads, if it reads at all.
    pub fn reader_path(&self, instance: InstanceId) -> Option<&Path> {
        match &self.source {
            LoadSource::Single { path, instance: i } => {
                (*i == instance).then_some(path.as_path())
            }
            LoadSource::PerInstance(paths) => paths
                .iter()
                .find(|(i, _)| *i == instance)
                .map(|(_, p)| p.as_path()),
        }
    }

    /// Largest instance id referenced by the source, used to validate the
    /// source against the actual cluster size.
    pub fn max_source_instance(&self) -> InstanceId {
        match &self.source {
            LoadSource::Single { instance, .. } => *instance,
            LoadSource::PerInstance(paths) => {
                paths.iter().map(|(i, _)| *i).max().unwrap_or(0)
            }
        }
    }

    /// Block size in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Header lines to skip.
    pub fn header(&self) -> u64 {
        self.header
    }

    /// Line delimiter byte.
    pub fn line_delimiter(&self) -> u8 {
        self.line_delimiter
    }

    /// Attribute delimiter byte.
    pub fn attribute_delimiter(&self) -> u8 {
        self.attribute_delimiter
    }

    /// Configured attribute count per record.
    pub fn num_attributes(&self) -> usize {
        self.num_attributes
    }

    /// Output chunk capacity in records.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Whether fields go along an extra dimension.
    pub fn split_on_dimension(&self) -> bool {
        self.split_on_dimension
    }
}

/// Output format selector for the save path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// Delimited text.
    Text,
    /// Fixed-layout binary: per cell a 1-byte null flag, then a fixed-width
    /// payload or a 4-byte length prefix plus bytes for variable-width
    /// columns.
    Binary,
    /// Arrow IPC stream.
    Arrow,
}

/// Validated configuration for the save path.
#[derive(Debug, Clone)]
pub struct SaveConfig {
    instance_map: BTreeMap<InstanceId, PathBuf>,
    format: SaveFormat,
    line_delimiter: u8,
    attribute_delimiter: u8,
    cells_per_chunk: Option<u64>,
    buffer_size: usize,
    null_representation: String,
    precision: Option<usize>,
    quote_strings: bool,
    print_header: bool,
    print_coordinates: bool,
    append: bool,
    max_result_bytes: Option<u64>,
}

impl SaveConfig {
    /// Creates a save configuration writing one file per entry of
    /// `instance_map` in the given format.
    pub fn try_new(
        instance_map: BTreeMap<InstanceId, PathBuf>,
        format: SaveFormat,
    ) -> Result<Self> {
        if instance_map.is_empty() {
            return Err(ShardlineError::Configuration(
                "no output file path was provided".to_owned(),
            ));
        }
        Ok(Self {
            instance_map,
            format,
            line_delimiter: b'\n',
            attribute_delimiter: b'\t',
            cells_per_chunk: Some(DEFAULT_CELLS_PER_CHUNK),
            buffer_size: DEFAULT_SAVE_BUFFER_SIZE,
            null_representation: "null".to_owned(),
            precision: None,
            quote_strings: false,
            print_header: false,
            print_coordinates: false,
            append: false,
            max_result_bytes: None,
        })
    }

    /// Sets the line delimiter byte (default `\n`).
    pub fn with_line_delimiter(mut self, delimiter: u8) -> Self {
        self.line_delimiter = delimiter;
        self
    }

    /// Sets the attribute delimiter byte (default `\t`).
    pub fn with_attribute_delimiter(mut self, delimiter: u8) -> Self {
        self.attribute_delimiter = delimiter;
        self
    }

    /// Seals chunks after this many cells. Takes precedence over the byte
    /// threshold. `None` switches sealing to the byte threshold alone.
    pub fn with_cells_per_chunk(mut self, cells: Option<u64>) -> Result<Self> {
        if cells == Some(0) {
            return Err(ShardlineError::Configuration(
                "cells_per_chunk must be positive".to_owned(),
            ));
        }
        self.cells_per_chunk = cells;
        Ok(self)
    }

    /// Byte threshold for sealing chunks when no cell threshold is set.
    pub fn with_buffer_size(mut self, bytes: usize) -> Result<Self> {
        if bytes == 0 {
            return Err(ShardlineError::Configuration(
                "buffer_size must be positive".to_owned(),
            ));
        }
        self.buffer_size = bytes;
        Ok(self)
    }

    /// Text printed for null cells (default `null`).
    pub fn with_null_representation(mut self, repr: impl Into<String>) -> Self {
        self.null_representation = repr.into();
        self
    }

    /// Fixed count of decimal digits for floats; `None` uses the shortest
    /// round-trippable representation.
    pub fn with_precision(mut self, precision: Option<usize>) -> Self {
        self.precision = precision;
        self
    }

    /// Single-quotes string values, escaping embedded quotes and backslashes.
    pub fn with_quote_strings(mut self, quote: bool) -> Self {
        self.quote_strings = quote;
        self
    }

    /// Prints a header line of attribute names before the first record.
    /// Text format only.
    pub fn with_print_header(mut self, print: bool) -> Self {
        self.print_header = print;
        self
    }

    /// Prefixes every text record with the cursor position it came from.
    pub fn with_print_coordinates(mut self, print: bool) -> Self {
        self.print_coordinates = print;
        self
    }

    /// Appends to existing output files instead of truncating them.
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Caps the per-file output size. The cap is configured in MiB and
    /// enforced in bytes (1 MiB = 1,048,576 bytes).
    pub fn with_max_result_mb(mut self, mb: Option<u64>) -> Result<Self> {
        if mb == Some(0) {
            return Err(ShardlineError::Configuration(
                "max_result_mb must be positive".to_owned(),
            ));
        }
        self.max_result_bytes = mb.map(|m| m * MIB);
        Ok(self)
    }

    /// Destination instance to output path map.
    pub fn instance_map(&self) -> &BTreeMap<InstanceId, PathBuf> {
        &self.instance_map
    }

    /// Output format.
    pub fn format(&self) -> SaveFormat {
        self.format
    }

    /// Line delimiter byte.
    pub fn line_delimiter(&self) -> u8 {
        self.line_delimiter
    }

    /// Attribute delimiter byte.
    pub fn attribute_delimiter(&self) -> u8 {
        self.attribute_delimiter
    }

    /// Cell threshold for sealing chunks, if set.
    pub fn cells_per_chunk(&self) -> Option<u64> {
        self.cells_per_chunk
    }

    /// Byte threshold for sealing chunks.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Null representation for text output.
    pub fn null_representation(&self) -> &str {
        &self.null_representation
    }

    /// Float precision, if fixed.
    pub fn precision(&self) -> Option<usize> {
        self.precision
    }

    /// Whether strings are quoted in text output.
    pub fn quote_strings(&self) -> bool {
        self.quote_strings
    }

    /// Whether a header line is printed.
    pub fn print_header(&self) -> bool {
        self.print_header
    }

    /// Whether coordinates are printed.
    pub fn print_coordinates(&self) -> bool {
        self.print_coordinates
    }

    /// Whether output files are opened in append mode.
    pub fn append(&self) -> bool {
        self.append
    }

    /// Byte cap on output size, if configured.
    pub fn max_result_bytes(&self) -> Option<u64> {
        self.max_result_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_defaults() {
        let config = LoadConfig::try_new(
            LoadSource::Single {
                path: PathBuf::from("/tmp/in.tsv"),
                instance: 0,
            },
            3,
        )
        .unwrap();
        assert_eq!(config.block_size(), DEFAULT_BLOCK_SIZE);
        assert_eq!(config.line_delimiter(), b'\n');
        assert_eq!(config.attribute_delimiter(), b'\t');
        assert_eq!(config.num_attributes(), 3);
        assert_eq!(config.reader_path(0), Some(Path::new("/tmp/in.tsv")));
        assert_eq!(config.reader_path(1), None);
    }

    #[test]
    fn test_load_config_rejects_zero_attributes() {
        let result = LoadConfig::try_new(
            LoadSource::Single {
                path: PathBuf::from("/tmp/in.tsv"),
                instance: 0,
            },
            0,
        );
        assert!(matches!(result, Err(ShardlineError::Configuration(_))));
    }

    #[test]
    fn test_load_config_rejects_duplicate_instances() {
        let result = LoadConfig::try_new(
            LoadSource::PerInstance(vec![
                (0, PathBuf::from("/tmp/a")),
                (0, PathBuf::from("/tmp/b")),
            ]),
            1,
        );
        assert!(matches!(result, Err(ShardlineError::Configuration(_))));
    }

    #[test]
    fn test_load_config_block_size_bounds() {
        let config = LoadConfig::try_new(
            LoadSource::Single {
                path: PathBuf::from("/tmp/in.tsv"),
                instance: 0,
            },
            1,
        )
        .unwrap();
        assert!(config.clone().with_block_size(8).is_err());
        assert!(config.clone().with_block_size(1024 * 1024 * 1024).is_err());
        assert!(config.with_block_size(9).is_ok());
    }

    #[test]
    fn test_save_config_cap_in_mib() {
        let mut map = BTreeMap::new();
        map.insert(0, PathBuf::from("/tmp/out"));
        let config = SaveConfig::try_new(map, SaveFormat::Text)
            .unwrap()
            .with_max_result_mb(Some(2))
            .unwrap();
        assert_eq!(config.max_result_bytes(), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_save_config_rejects_empty_map() {
        let result = SaveConfig::try_new(BTreeMap::new(), SaveFormat::Text);
        assert!(matches!(result, Err(ShardlineError::Configuration(_))));
    }
}
