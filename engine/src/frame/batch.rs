/*
 * PanSim
 * Copyright (c) 2020  ThoughtWorks, Inc.
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 *
 */

//! Self-describing record batches: the schema travels with the columns, and
//! the receiving side verifies it against the schema it expects before any
//! column is touched.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::schema::{DataType, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int8(Vec<i8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int8(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Column::Int8(_) => DataType::Int8,
            Column::Int32(_) => DataType::Int32,
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
        }
    }

    pub fn into_i8(self) -> Result<Vec<i8>> {
        match self {
            Column::Int8(v) => Ok(v),
            other => Err(type_error(DataType::Int8, other.dtype())),
        }
    }

    pub fn into_i32(self) -> Result<Vec<i32>> {
        match self {
            Column::Int32(v) => Ok(v),
            other => Err(type_error(DataType::Int32, other.dtype())),
        }
    }

    pub fn into_i64(self) -> Result<Vec<i64>> {
        match self {
            Column::Int64(v) => Ok(v),
            other => Err(type_error(DataType::Int64, other.dtype())),
        }
    }

    pub fn into_f64(self) -> Result<Vec<f64>> {
        match self {
            Column::Float64(v) => Ok(v),
            other => Err(type_error(DataType::Float64, other.dtype())),
        }
    }
}

fn type_error(expected: DataType, got: DataType) -> Error {
    Error::Transport(format!("expected {:?} column, got {:?}", expected, got))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub schema: Schema,
    pub columns: Vec<Column>,
}

impl RecordBatch {
    pub fn new(schema: Schema, columns: Vec<Column>) -> Result<RecordBatch> {
        if schema.n_fields() != columns.len() {
            return Err(Error::Transport(format!(
                "schema has {} fields but batch has {} columns",
                schema.n_fields(),
                columns.len()
            )));
        }
        let n_rows = columns.first().map_or(0, Column::len);
        for (field, column) in schema.fields.iter().zip(&columns) {
            if field.dtype != column.dtype() {
                return Err(Error::Transport(format!(
                    "column {} is {:?}, schema says {:?}",
                    field.name,
                    column.dtype(),
                    field.dtype
                )));
            }
            if column.len() != n_rows {
                return Err(Error::Transport(format!(
                    "column {} has {} rows, expected {}",
                    field.name,
                    column.len(),
                    n_rows
                )));
            }
        }
        Ok(RecordBatch { schema, columns })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8], expected: &Schema) -> Result<RecordBatch> {
        let batch: RecordBatch = bincode::deserialize(bytes)?;
        if &batch.schema != expected {
            return Err(Error::Transport(format!(
                "record batch schema mismatch: got {:?}",
                batch.schema.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>()
            )));
        }
        Ok(batch)
    }
}
