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

//! Tabular frames exchanged between the pipeline stages, and the record
//! batches they travel in.

pub mod batch;
pub mod schema;
pub mod state;
pub mod visit;
pub mod visit_output;

pub use batch::{Column, RecordBatch};
pub use schema::{state_schema, visit_output_schema, visit_schema, DataType, Field, Schema};
pub use state::StateFrame;
pub use visit::VisitFrame;
pub use visit_output::VisitOutputFrame;

use crate::error::Result;

/// A typed frame that can travel as a record batch.
pub trait Frame: Sized {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn to_batch(&self, schema: &Schema) -> Result<RecordBatch>;

    fn from_batch(batch: RecordBatch) -> Result<Self>;
}
