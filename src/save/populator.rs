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

//! Chunk serialization for the three output formats.

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, Int8Array, StringArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Schema};
use arrow::ipc::writer::StreamWriter;

use crate::config::{SaveConfig, SaveFormat};
use crate::error::{Result, ShardlineError};
use crate::save::chunk::ChunkBuffer;
use crate::save::cursor::ArrayCursor;

/// Serializes rows from a cursor into chunk buffers, one format each.
///
/// One `populate` call fills one chunk: it consumes rows until the cursor
/// is exhausted or the chunk is full. A cell threshold
/// (`cells_per_chunk`), when configured, takes precedence over the byte
/// threshold (`buffer_size`). A chunk always holds at least one row.
pub enum ChunkPopulator {
    /// Delimited text.
    Text,
    /// Null-flag plus fixed-width or length-prefixed cells.
    Binary,
    /// One Arrow IPC stream holding one record batch per chunk.
    Arrow,
}

impl ChunkPopulator {
    /// Picks the populator for `format`, rejecting schemas with column
    /// types the text and binary serializers cannot express.
    pub fn try_new(format: SaveFormat, schema: &Schema) -> Result<Self> {
        match format {
            SaveFormat::Arrow => Ok(Self::Arrow),
            SaveFormat::Text | SaveFormat::Binary => {
                for field in schema.fields() {
                    if !cell_type_supported(field.data_type()) {
                        return Err(ShardlineError::Configuration(format!(
                            "column {} has type {} which {format:?} output cannot express",
                            field.name(),
                            field.data_type()
                        )));
                    }
                }
                Ok(match format {
                    SaveFormat::Text => Self::Text,
                    _ => Self::Binary,
                })
            }
        }
    }

    /// Fills `buffer` with the next chunk. Returns the number of rows
    /// consumed; zero means the cursor was already exhausted.
    pub fn populate(
        &self,
        buffer: &mut ChunkBuffer,
        cursor: &mut ArrayCursor,
        config: &SaveConfig,
    ) -> Result<u64> {
        match self {
            Self::Text => populate_text(buffer, cursor, config),
            Self::Binary => populate_binary(buffer, cursor, config),
            Self::Arrow => populate_arrow(buffer, cursor, config),
        }
    }
}

fn cell_type_supported(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean
            | DataType::Utf8
            | DataType::Binary
    )
}

fn chunk_full(rows: u64, bytes: usize, config: &SaveConfig) -> bool {
    match config.cells_per_chunk() {
        Some(cells) => rows >= cells,
        None => bytes >= config.buffer_size(),
    }
}

// Text rows are assembled as raw bytes: the delimiters are arbitrary u8
// values, not necessarily ASCII, and must land in the file verbatim.
fn populate_text(
    buffer: &mut ChunkBuffer,
    cursor: &mut ArrayCursor,
    config: &SaveConfig,
) -> Result<u64> {
    let mut out = Vec::new();
    let mut rows = 0u64;
    while !cursor.is_end() && !chunk_full(rows, out.len(), config) {
        format_text_row(cursor, config, &mut out)?;
        cursor.advance();
        rows += 1;
    }
    buffer.write_bytes(&out);
    Ok(rows)
}

fn format_text_row(
    cursor: &ArrayCursor,
    config: &SaveConfig,
    out: &mut Vec<u8>,
) -> Result<()> {
    let batch = cursor.batch();
    let row = cursor.row();
    let delim = config.attribute_delimiter();
    if config.print_coordinates() {
        let (b, r) = cursor.position();
        out.extend_from_slice(b.to_string().as_bytes());
        out.push(delim);
        out.extend_from_slice(r.to_string().as_bytes());
    }
    for (i, column) in batch.columns().iter().enumerate() {
        if i > 0 || config.print_coordinates() {
            out.push(delim);
        }
        if column.is_null(row) {
            out.extend_from_slice(config.null_representation().as_bytes());
        } else {
            format_text_cell(column, row, config, out)?;
        }
    }
    out.push(config.line_delimiter());
    Ok(())
}

fn format_text_cell(
    column: &ArrayRef,
    row: usize,
    config: &SaveConfig,
    out: &mut Vec<u8>,
) -> Result<()> {
    macro_rules! push_display {
        ($array:ty) => {{
            let a = downcast::<$array>(column)?;
            out.extend_from_slice(a.value(row).to_string().as_bytes());
        }};
    }
    match column.data_type() {
        DataType::Utf8 => {
            let a = downcast::<StringArray>(column)?;
            push_string(out, a.value(row), config.quote_strings());
        }
        DataType::Binary => {
            let a = downcast::<BinaryArray>(column)?;
            push_string(
                out,
                &String::from_utf8_lossy(a.value(row)),
                config.quote_strings(),
            );
        }
        DataType::Boolean => {
            let a = downcast::<BooleanArray>(column)?;
            out.extend_from_slice(if a.value(row) { b"true" } else { b"false" });
        }
        DataType::Float32 => {
            let a = downcast::<Float32Array>(column)?;
            push_float(out, f64::from(a.value(row)), config.precision());
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(column)?;
            push_float(out, a.value(row), config.precision());
        }
        DataType::Int8 => push_display!(Int8Array),
        DataType::Int16 => push_display!(Int16Array),
        DataType::Int32 => push_display!(Int32Array),
        DataType::Int64 => push_display!(Int64Array),
        DataType::UInt8 => push_display!(UInt8Array),
        DataType::UInt16 => push_display!(UInt16Array),
        DataType::UInt32 => push_display!(UInt32Array),
        DataType::UInt64 => push_display!(UInt64Array),
        other => {
            return Err(ShardlineError::Internal(format!(
                "unexpected column type {other} in text serializer"
            )))
        }
    }
    Ok(())
}

fn push_string(out: &mut Vec<u8>, value: &str, quote: bool) {
    if !quote {
        out.extend_from_slice(value.as_bytes());
        return;
    }
    out.push(b'\'');
    for &b in value.as_bytes() {
        match b {
            b'\'' => out.extend_from_slice(b"\\'"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
    out.push(b'\'');
}

fn push_float(out: &mut Vec<u8>, value: f64, precision: Option<usize>) {
    if value.is_nan() {
        out.extend_from_slice(b"nan");
    } else if let Some(p) = precision {
        out.extend_from_slice(format!("{value:.p$}").as_bytes());
    } else {
        out.extend_from_slice(format!("{value}").as_bytes());
    }
}

fn populate_binary(
    buffer: &mut ChunkBuffer,
    cursor: &mut ArrayCursor,
    config: &SaveConfig,
) -> Result<u64> {
    let start = buffer.len();
    let mut rows = 0u64;
    while !cursor.is_end() && !chunk_full(rows, buffer.len() - start, config) {
        write_binary_row(cursor, buffer)?;
        cursor.advance();
        rows += 1;
    }
    Ok(rows)
}

/// Per cell: a 1-byte null flag (0 = present, 1 = null), then either the
/// fixed-width little-endian payload (zero-filled when null) or, for
/// variable-width columns, a `u32` little-endian length prefix and the
/// bytes (length 0 when null).
fn write_binary_row(cursor: &ArrayCursor, buffer: &mut ChunkBuffer) -> Result<()> {
    let batch = cursor.batch();
    let row = cursor.row();
    for column in batch.columns() {
        let null = column.is_null(row);
        buffer.write_byte(u8::from(null));
        macro_rules! write_fixed {
            ($array:ty, $width:expr) => {{
                if null {
                    buffer.write_bytes(&[0u8; $width]);
                } else {
                    let a = downcast::<$array>(column)?;
                    buffer.write_bytes(&a.value(row).to_le_bytes());
                }
            }};
        }
        match column.data_type() {
            DataType::Utf8 => {
                let value = if null {
                    &[][..]
                } else {
                    downcast::<StringArray>(column)?.value(row).as_bytes()
                };
                write_var_cell(buffer, value)?;
            }
            DataType::Binary => {
                let value = if null {
                    &[][..]
                } else {
                    downcast::<BinaryArray>(column)?.value(row)
                };
                write_var_cell(buffer, value)?;
            }
            DataType::Boolean => {
                if null {
                    buffer.write_byte(0);
                } else {
                    let a = downcast::<BooleanArray>(column)?;
                    buffer.write_byte(u8::from(a.value(row)));
                }
            }
            DataType::Int8 => write_fixed!(Int8Array, 1),
            DataType::Int16 => write_fixed!(Int16Array, 2),
            DataType::Int32 => write_fixed!(Int32Array, 4),
            DataType::Int64 => write_fixed!(Int64Array, 8),
            DataType::UInt8 => write_fixed!(UInt8Array, 1),
            DataType::UInt16 => write_fixed!(UInt16Array, 2),
            DataType::UInt32 => write_fixed!(UInt32Array, 4),
            DataType::UInt64 => write_fixed!(UInt64Array, 8),
            DataType::Float32 => write_fixed!(Float32Array, 4),
            DataType::Float64 => write_fixed!(Float64Array, 8),
            other => {
                return Err(ShardlineError::Internal(format!(
                    "unexpected column type {other} in binary serializer"
                )))
            }
        }
    }
    Ok(())
}

fn write_var_cell(buffer: &mut ChunkBuffer, value: &[u8]) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        ShardlineError::Internal(format!(
            "cell of {} bytes exceeds the binary length prefix",
            value.len()
        ))
    })?;
    buffer.write_bytes(&len.to_le_bytes());
    buffer.write_bytes(value);
    Ok(())
}

fn populate_arrow(
    buffer: &mut ChunkBuffer,
    cursor: &mut ArrayCursor,
    config: &SaveConfig,
) -> Result<u64> {
    if cursor.is_end() {
        return Ok(0);
    }
    let start = cursor.row();
    let available = cursor.batch().num_rows() - start;
    let take = match config.cells_per_chunk() {
        Some(cells) => available.min(usize::try_from(cells).unwrap_or(usize::MAX)),
        None => {
            // no cell threshold: bound the slice by the byte threshold,
            // estimating the row size from the batch's in-memory footprint
            let batch = cursor.batch();
            let row_bytes =
                (batch.get_array_memory_size() / batch.num_rows().max(1)).max(1);
            available.min((config.buffer_size() / row_bytes).max(1))
        }
    };
    let slice = cursor.batch().slice(start, take);
    let schema = cursor.schema();
    let mut writer = StreamWriter::try_new(&mut *buffer, schema.as_ref())?;
    writer.write(&slice)?;
    writer.finish()?;
    drop(writer);
    for _ in 0..take {
        cursor.advance();
    }
    Ok(take as u64)
}

fn downcast<'a, T: 'static>(column: &'a ArrayRef) -> Result<&'a T> {
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        ShardlineError::Internal("column type and array type disagree".to_owned())
    })
}
