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

//! Row-wise walk over this instance's record batches.

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::{Result, ShardlineError};

/// Walks the rows of a sequence of record batches in order.
///
/// Empty batches are skipped transparently, so whenever the cursor is not
/// at the end, [`batch`](Self::batch) and [`row`](Self::row) address a
/// real row.
pub struct ArrayCursor {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    batch_idx: usize,
    row: usize,
}

impl ArrayCursor {
    /// Creates a cursor over `batches`, all of which must carry `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for batch in &batches {
            if batch.schema() != schema {
                return Err(ShardlineError::Internal(
                    "record batch schema does not match the save schema".to_owned(),
                ));
            }
        }
        let mut cursor = Self {
            schema,
            batches,
            batch_idx: 0,
            row: 0,
        };
        cursor.skip_empty();
        Ok(cursor)
    }

    /// Schema shared by all batches.
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Whether every row has been consumed.
    pub fn is_end(&self) -> bool {
        self.batch_idx >= self.batches.len()
    }

    /// The batch holding the current row. Must not be at the end.
    pub fn batch(&self) -> &RecordBatch {
        &self.batches[self.batch_idx]
    }

    /// Index of the current row within [`batch`](Self::batch).
    pub fn row(&self) -> usize {
        self.row
    }

    /// Position of the current row as `(batch, row)`.
    pub fn position(&self) -> (usize, usize) {
        (self.batch_idx, self.row)
    }

    /// Moves to the next row.
    pub fn advance(&mut self) {
        if self.is_end() {
            return;
        }
        self.row += 1;
        if self.row >= self.batches[self.batch_idx].num_rows() {
            self.batch_idx += 1;
            self.row = 0;
            self.skip_empty();
        }
    }

    fn skip_empty(&mut self) {
        while self.batch_idx < self.batches.len()
            && self.batches[self.batch_idx].num_rows() == 0
        {
            self.batch_idx += 1;
        }
    }
}
