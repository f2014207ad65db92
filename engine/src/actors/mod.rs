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

//! The per-tick pipeline: every rank hosts a location actor and a
//! progression actor, behavior ranks additionally host a behavior actor,
//! and the master rank hosts the main actor that drives the ticks.

pub mod behavior;
pub mod config;
pub mod location;
pub mod main_actor;
pub mod progression;
pub mod worker;

pub use behavior::BehaviorActor;
pub use config::ConfigContext;
pub use location::LocationActor;
pub use main_actor::MainActor;
pub use progression::ProgressionActor;
pub use worker::Worker;

use crate::error::Result;
use crate::frame::{Frame, RecordBatch, Schema};

/// Encode one scatter share; an empty share travels as the explicit empty
/// message that feeds the count-to-N barriers.
pub(crate) fn encode_share<F: Frame>(frame: &F, schema: &Schema) -> Result<Option<Vec<u8>>> {
    if frame.is_empty() {
        Ok(None)
    } else {
        Ok(Some(frame.to_batch(schema)?.encode()?))
    }
}

/// Decode the non-empty shares accumulated at a barrier.
pub(crate) fn decode_shares<F: Frame>(
    batches: Vec<Option<Vec<u8>>>,
    schema: &Schema,
) -> Result<Vec<F>> {
    batches
        .into_iter()
        .flatten()
        .map(|bytes| F::from_batch(RecordBatch::decode(&bytes, schema)?))
        .collect()
}
