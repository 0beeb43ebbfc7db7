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

//! Record batch construction from parsed fields.

use std::mem;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringBuilder, UInt32Builder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use crate::error::{Result, ShardlineError};

/// Accumulates parsed fields into one output chunk (a `RecordBatch`).
///
/// A record with exactly `num_attributes` fields gets a null error marker.
/// Extra fields are folded, joined by the attribute delimiter, into an
/// error value prefixed `long`; a record with too few fields pads the
/// missing attributes with nulls and records the error value `short`.
/// Field bytes that are not valid UTF-8 are replaced when materialized.
///
/// In the default column layout the chunk has one nullable string column
/// per attribute (`a0..`) plus a trailing `error` column. With
/// `split_on_dimension` the chunk is `(field: UInt32, value: Utf8)` rows
/// instead: each record occupies `num_attributes + 1` consecutive rows,
/// the error marker at field index 0 and the attributes at 1 onward.
pub struct RecordWriter {
    schema: SchemaRef,
    num_attributes: usize,
    attribute_delimiter: u8,
    chunk_capacity: u64,
    split_on_dimension: bool,
    column: usize,
    fields: Vec<Option<String>>,
    error_buf: Vec<u8>,
    records_in_chunk: u64,
    string_builders: Vec<StringBuilder>,
    field_no_builder: UInt32Builder,
}

impl RecordWriter {
    /// Creates a writer for records of `num_attributes` fields, sealing
    /// chunks that exceed `chunk_capacity` records with an error.
    pub fn new(
        num_attributes: usize,
        attribute_delimiter: u8,
        chunk_capacity: u64,
        split_on_dimension: bool,
    ) -> Self {
        let builder_count = if split_on_dimension {
            1
        } else {
            num_attributes + 1
        };
        Self {
            schema: output_schema(num_attributes, split_on_dimension),
            num_attributes,
            attribute_delimiter,
            chunk_capacity,
            split_on_dimension,
            column: 0,
            fields: vec![None; num_attributes],
            error_buf: Vec::new(),
            records_in_chunk: 0,
            string_builders: (0..builder_count).map(|_| StringBuilder::new()).collect(),
            field_no_builder: UInt32Builder::new(),
        }
    }

    /// The schema of every chunk this writer produces.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Appends one field of the current record.
    pub fn write_field(&mut self, bytes: &[u8]) {
        if self.column < self.num_attributes {
            self.fields[self.column] =
                Some(String::from_utf8_lossy(bytes).into_owned());
        } else {
            // joined as raw bytes so a non-ASCII delimiter survives intact
            if self.column == self.num_attributes {
                self.error_buf.extend_from_slice(b"long");
            }
            self.error_buf.push(self.attribute_delimiter);
            self.error_buf.extend_from_slice(bytes);
        }
        self.column += 1;
    }

    /// Closes the current record.
    pub fn end_record(&mut self) -> Result<()> {
        self.records_in_chunk += 1;
        if self.records_in_chunk > self.chunk_capacity {
            return Err(ShardlineError::ChunkOverflow(format!(
                "a block produced more than {} records; increase chunk_size",
                self.chunk_capacity
            )));
        }
        if self.column < self.num_attributes {
            self.error_buf.extend_from_slice(b"short");
        }
        let error = if self.error_buf.is_empty() {
            None
        } else {
            let buf = mem::take(&mut self.error_buf);
            Some(String::from_utf8_lossy(&buf).into_owned())
        };
        if self.split_on_dimension {
            self.field_no_builder.append_value(0);
            self.string_builders[0].append_option(error);
            for i in 0..self.num_attributes {
                self.field_no_builder.append_value(i as u32 + 1);
                self.string_builders[0].append_option(self.fields[i].take());
            }
        } else {
            for i in 0..self.num_attributes {
                self.string_builders[i].append_option(self.fields[i].take());
            }
            self.string_builders[self.num_attributes].append_option(error);
        }
        self.column = 0;
        Ok(())
    }

    /// Seals the current chunk, or returns `None` when no record was
    /// written since the last seal.
    pub fn finish_chunk(&mut self) -> Result<Option<RecordBatch>> {
        if self.column != 0 {
            return Err(ShardlineError::Internal(
                "chunk sealed in the middle of a record".to_owned(),
            ));
        }
        if self.records_in_chunk == 0 {
            return Ok(None);
        }
        self.records_in_chunk = 0;
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.schema.fields().len());
        if self.split_on_dimension {
            arrays.push(Arc::new(self.field_no_builder.finish()));
        }
        for builder in &mut self.string_builders {
            arrays.push(Arc::new(builder.finish()));
        }
        Ok(Some(RecordBatch::try_new(self.schema.clone(), arrays)?))
    }
}

/// The load output schema for `num_attributes` configured attributes.
pub fn output_schema(num_attributes: usize, split_on_dimension: bool) -> SchemaRef {
    let fields = if split_on_dimension {
        vec![
            Field::new("field", DataType::UInt32, false),
            Field::new("value", DataType::Utf8, true),
        ]
    } else {
        let mut fields: Vec<Field> = (0..num_attributes)
            .map(|i| Field::new(format!("a{i}"), DataType::Utf8, true))
            .collect();
        fields.push(Field::new("error", DataType::Utf8, true));
        fields
    };
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use arrow::array::{Array, StringArray, UInt32Array};

    use super::*;

    fn string_column(batch: &RecordBatch, i: usize) -> &StringArray {
        batch
            .column(i)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
    }

    fn write_record(writer: &mut RecordWriter, fields: &[&str]) {
        for f in fields {
            writer.write_field(f.as_bytes());
        }
        writer.end_record().unwrap();
    }

    #[test]
    fn test_exact_field_count_has_null_error() {
        let mut writer = RecordWriter::new(2, b',', 100, false);
        write_record(&mut writer, &["a", "1"]);
        let batch = writer.finish_chunk().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(string_column(&batch, 0).value(0), "a");
        assert_eq!(string_column(&batch, 1).value(0), "1");
        assert!(string_column(&batch, 2).is_null(0));
    }

    #[test]
    fn test_long_record_marker() {
        let mut writer = RecordWriter::new(2, b',', 100, false);
        write_record(&mut writer, &["a", "b", "c", "d"]);
        let batch = writer.finish_chunk().unwrap().unwrap();
        assert_eq!(string_column(&batch, 0).value(0), "a");
        assert_eq!(string_column(&batch, 1).value(0), "b");
        assert_eq!(string_column(&batch, 2).value(0), "long,c,d");
    }

    #[test]
    fn test_long_marker_with_non_ascii_delimiter() {
        let mut writer = RecordWriter::new(1, 0xff, 100, false);
        write_record(&mut writer, &["a", "b"]);
        let batch = writer.finish_chunk().unwrap().unwrap();
        // the 0xff join byte is not valid UTF-8 on its own and is replaced
        // when the marker lands in the string column
        assert_eq!(string_column(&batch, 1).value(0), "long\u{fffd}b");
    }

    #[test]
    fn test_short_record_marker() {
        let mut writer = RecordWriter::new(3, b',', 100, false);
        write_record(&mut writer, &["only"]);
        let batch = writer.finish_chunk().unwrap().unwrap();
        assert_eq!(string_column(&batch, 0).value(0), "only");
        assert!(string_column(&batch, 1).is_null(0));
        assert!(string_column(&batch, 2).is_null(0));
        assert_eq!(string_column(&batch, 3).value(0), "short");
    }

    #[test]
    fn test_split_on_dimension_error_first() {
        let mut writer = RecordWriter::new(2, b',', 100, true);
        write_record(&mut writer, &["a", "b", "c"]);
        write_record(&mut writer, &["x", "y"]);
        let batch = writer.finish_chunk().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 6);
        let field_no = batch
            .column(0)
            .as_any()
            .downcast_ref::<UInt32Array>()
            .unwrap();
        let values = string_column(&batch, 1);
        let positions: Vec<u32> = field_no.values().to_vec();
        assert_eq!(positions, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(values.value(0), "long,c");
        assert_eq!(values.value(1), "a");
        assert_eq!(values.value(2), "b");
        assert!(values.is_null(3));
        assert_eq!(values.value(4), "x");
        assert_eq!(values.value(5), "y");
    }

    #[test]
    fn test_chunk_overflow() {
        let mut writer = RecordWriter::new(1, b',', 2, false);
        write_record(&mut writer, &["a"]);
        write_record(&mut writer, &["b"]);
        writer.write_field(b"c");
        assert!(matches!(
            writer.end_record(),
            Err(ShardlineError::ChunkOverflow(_))
        ));
    }

    #[test]
    fn test_empty_chunk_yields_none() {
        let mut writer = RecordWriter::new(1, b',', 10, false);
        assert!(writer.finish_chunk().unwrap().is_none());
    }

    #[test]
    fn test_capacity_resets_between_chunks() {
        let mut writer = RecordWriter::new(1, b',', 1, false);
        write_record(&mut writer, &["a"]);
        writer.finish_chunk().unwrap().unwrap();
        write_record(&mut writer, &["b"]);
        let batch = writer.finish_chunk().unwrap().unwrap();
        assert_eq!(batch.num_rows(), 1);
    }
}
