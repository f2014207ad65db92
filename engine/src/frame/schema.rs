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

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int32,
    Int64,
    Float64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: DataType,
}

/// Ordered column layout of a record batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<(&str, DataType)>) -> Schema {
        Schema {
            fields: fields
                .into_iter()
                .map(|(name, dtype)| Field { name: name.to_string(), dtype })
                .collect(),
        }
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }
}

fn with_attrs(mut schema: Schema, attrs: &[String], dtype: DataType) -> Result<Schema> {
    for attr in attrs {
        if schema.fields.iter().any(|f| &f.name == attr) {
            return Err(Error::Config(format!(
                "visual attribute {} collides with an existing column",
                attr
            )));
        }
        schema.fields.push(Field { name: attr.clone(), dtype });
    }
    Ok(schema)
}

pub fn visit_schema(attrs: &[String]) -> Result<Schema> {
    let base = Schema::new(vec![
        ("lid", DataType::Int64),
        ("pid", DataType::Int64),
        ("group", DataType::Int8),
        ("state", DataType::Int8),
        ("behavior", DataType::Int8),
        ("start_time", DataType::Int32),
        ("end_time", DataType::Int32),
    ]);
    with_attrs(base, attrs, DataType::Int8)
}

pub fn visit_output_schema(attrs: &[String]) -> Result<Schema> {
    let base = Schema::new(vec![
        ("lid", DataType::Int64),
        ("pid", DataType::Int64),
        ("inf_prob", DataType::Float64),
        ("n_contacts", DataType::Int32),
    ]);
    with_attrs(base, attrs, DataType::Int32)
}

pub fn state_schema() -> Schema {
    Schema::new(vec![
        ("pid", DataType::Int64),
        ("group", DataType::Int8),
        ("current_state", DataType::Int8),
        ("next_state", DataType::Int8),
        ("dwell_time", DataType::Int32),
        ("seed", DataType::Int64),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visit_schema_appends_attributes() {
        let schema = visit_schema(&["mask".to_string()]).unwrap();
        assert_eq!(schema.n_fields(), 8);
        assert_eq!(schema.fields[7].name, "mask");
        assert_eq!(schema.fields[7].dtype, DataType::Int8);
    }

    #[test]
    fn should_reject_colliding_attribute() {
        let result = visit_schema(&["pid".to_string()]);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
