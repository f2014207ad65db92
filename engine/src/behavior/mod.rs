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

//! The behavior stage is pluggable: given the progressed state and the visit
//! outputs of the tick that just finished, a behavior model produces the
//! next tick's state and visit frames.

pub mod cont_seed;
pub mod replay;

use fxhash::FxHashSet;

use crate::config::SimConfig;
use crate::error::Result;
use crate::frame::{StateFrame, VisitFrame, VisitOutputFrame};
use crate::models::custom_types::Pid;

pub use cont_seed::ContinuousSeedBehavior;
pub use replay::ReplayBehavior;

pub trait BehaviorModel: Send {
    /// The state frame to feed into the upcoming tick.
    fn next_state(&self) -> &StateFrame;

    /// The visit frame to feed into the upcoming tick.
    fn next_visits(&self) -> &VisitFrame;

    /// Consume the finished tick's outputs and prepare the next frames.
    fn run(&mut self, new_state: StateFrame, visit_output: VisitOutputFrame) -> Result<()>;
}

/// Build the behavior model the configuration asks for, restricted to
/// `pids` when the population is sharded across behavior ranks.
pub fn build_behavior_model(
    config: &SimConfig,
    exposed_state: i8,
    pids: Option<FxHashSet<Pid>>,
    model_seed: i64,
) -> Result<Box<dyn BehaviorModel>> {
    if config.start_exposed_seed.is_some() || config.tick_exposed_seed.is_some() {
        Ok(Box::new(ContinuousSeedBehavior::new(config, exposed_state, pids, model_seed)?))
    } else {
        Ok(Box::new(ReplayBehavior::new(config, pids)?))
    }
}
