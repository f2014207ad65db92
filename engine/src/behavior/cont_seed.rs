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

//! Replay behavior with continuous seeding: optionally reset the population
//! and expose k persons at tick 0, and re-expose k susceptible persons at
//! every later tick.

use fxhash::FxHashSet;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::behavior::replay::ReplayBehavior;
use crate::behavior::BehaviorModel;
use crate::config::SimConfig;
use crate::error::Result;
use crate::frame::{Frame, StateFrame, VisitFrame, VisitOutputFrame};
use crate::models::constants::{NULL_DWELL_TIME, NULL_STATE, SUSCEPTIBLE_STATE};
use crate::models::custom_types::Pid;

pub struct ContinuousSeedBehavior {
    replay: ReplayBehavior,
    rng: StdRng,
    exposed_state: i8,
    tick_exposed: Option<usize>,
}

fn expose(state: &mut StateFrame, row: usize, exposed_state: i8) {
    state.current_state[row] = exposed_state;
    state.next_state[row] = NULL_STATE;
    state.dwell_time[row] = NULL_DWELL_TIME;
}

impl ContinuousSeedBehavior {
    pub fn new(
        config: &SimConfig,
        exposed_state: i8,
        pids: Option<FxHashSet<Pid>>,
        model_seed: i64,
    ) -> Result<ContinuousSeedBehavior> {
        let mut replay = ReplayBehavior::new(config, pids)?;
        let mut rng = StdRng::seed_from_u64(model_seed as u64);

        if let Some(k) = config.start_exposed_seed {
            let state = replay.next_state_mut();
            for row in 0..state.len() {
                state.current_state[row] = SUSCEPTIBLE_STATE;
                state.next_state[row] = NULL_STATE;
                state.dwell_time[row] = NULL_DWELL_TIME;
            }
            let population = state.len();
            let k = k.min(population);
            info!("setting {} persons to exposed", k);
            for row in rand::seq::index::sample(&mut rng, population, k) {
                expose(state, row, exposed_state);
            }
            replay.resync_visits()?;
        }

        Ok(ContinuousSeedBehavior {
            replay,
            rng,
            exposed_state,
            tick_exposed: config.tick_exposed_seed,
        })
    }
}

impl BehaviorModel for ContinuousSeedBehavior {
    fn next_state(&self) -> &StateFrame {
        self.replay.next_state()
    }

    fn next_visits(&self) -> &VisitFrame {
        self.replay.next_visits()
    }

    fn run(&mut self, new_state: StateFrame, visit_output: VisitOutputFrame) -> Result<()> {
        self.replay.run(new_state, visit_output)?;

        if let Some(k) = self.tick_exposed {
            let state = self.replay.next_state_mut();
            let susceptible: Vec<usize> = (0..state.len())
                .filter(|&row| state.current_state[row] == SUSCEPTIBLE_STATE)
                .collect();
            info!("{} persons are susceptible", susceptible.len());
            let k = k.min(susceptible.len());
            if k < self.tick_exposed.unwrap_or(0) {
                warn!("only {} susceptible persons left to expose", k);
            }
            info!("setting {} persons to exposed", k);
            let exposed_state = self.exposed_state;
            for pick in rand::seq::index::sample(&mut self.rng, susceptible.len(), k) {
                expose(state, susceptible[pick], exposed_state);
            }
            self.replay.resync_visits()?;
        }
        Ok(())
    }
}
