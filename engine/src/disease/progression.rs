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

//! Progression kernel: one person, one tick. Exposure check, transition
//! selection and dwell advance run in that order within a single call, so a
//! person exposed this tick immediately selects its transition and starts
//! counting down.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::disease::model::DiseaseModel;
use crate::models::constants::{NULL_DWELL_TIME, NULL_STATE};
use crate::models::custom_types::Pid;

/// One row of the person-state frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonState {
    pub pid: Pid,
    pub group: i8,
    pub current_state: i8,
    pub next_state: i8,
    pub dwell_time: i32,
    pub seed: i64,
}

impl PersonState {
    /// Either both sentinels or both non-negative.
    pub fn invariant_holds(&self) -> bool {
        if self.dwell_time == NULL_DWELL_TIME {
            self.next_state == NULL_STATE
        } else {
            self.dwell_time >= 0 && self.next_state >= 0
        }
    }
}

/// Advance one person by one tick. `inf_probs` are the infection
/// probabilities of the visit outputs touching this pid (possibly empty).
pub fn compute_progression_output(
    model: &DiseaseModel,
    state: &PersonState,
    inf_probs: &[f64],
    tick_time: i32,
) -> PersonState {
    let mut rng = StdRng::seed_from_u64(state.seed as u64);

    let mut current_state = state.current_state;
    let mut next_state = state.next_state;
    let mut dwell_time = state.dwell_time;

    if dwell_time == NULL_DWELL_TIME {
        // Combined probability over independent per-visit exposures.
        let p_total = 1.0 - inf_probs.iter().map(|p| 1.0 - p).product::<f64>();

        if p_total > 0.0 {
            let u: f64 = rng.gen();
            if u < p_total {
                current_state = model.exposed_state();
                next_state = NULL_STATE;
                dwell_time = NULL_DWELL_TIME;
            }
        }

        if let Some(sampler) = model.progression_sampler(current_state, state.group) {
            next_state = sampler.sample(&mut rng) as i8;
            let dwell = model
                .dwell_sampler(current_state, state.group, next_state)
                .unwrap_or_else(|| {
                    panic!(
                        "no dwell-time sampler for transition {} -> {}",
                        current_state, next_state
                    )
                });
            dwell_time = dwell.sample(&mut rng) as i32;
        }
    }

    if dwell_time != NULL_DWELL_TIME {
        if dwell_time > 0 {
            dwell_time = (dwell_time - tick_time).max(0);
        } else {
            current_state = next_state;
            dwell_time = NULL_DWELL_TIME;
            next_state = NULL_STATE;
        }
    }

    PersonState {
        pid: state.pid,
        group: state.group,
        current_state,
        next_state,
        dwell_time,
        seed: rng.gen::<i64>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::model::DiseaseModel;

    const SEIR_MODEL: &str = r#"
states: [S, E, I, R]
groups: [adult]
behaviors: [base]
susceptibility:
  S: {adult: 1.0}
infectivity:
  I: {adult: 1.0}
behavior_modifier:
  base: {base: 1.0}
progression:
  E:
    adult: {I: 1.0}
distribution:
  d3: {dist: fixed, value: 3}
dwell_time:
  E:
    adult: {I: d3}
unit_time: 1.0
exposed_state: E
"#;

    fn model() -> DiseaseModel {
        DiseaseModel::from_str(SEIR_MODEL).unwrap()
    }

    fn susceptible(pid: Pid) -> PersonState {
        PersonState {
            pid,
            group: 0,
            current_state: 0,
            next_state: NULL_STATE,
            dwell_time: NULL_DWELL_TIME,
            seed: 17,
        }
    }

    #[test]
    fn certain_exposure_starts_transition() {
        let model = model();
        let state = susceptible(1);
        let new = compute_progression_output(&model, &state, &[1.0], 1);

        // Exposed, E -> I selected with dwell 3, advanced once this tick.
        assert_eq!(new.current_state, 1);
        assert_eq!(new.next_state, 2);
        assert_eq!(new.dwell_time, 2);
        assert!(new.invariant_holds());
        assert_ne!(new.seed, state.seed);
    }

    #[test]
    fn no_visits_leaves_susceptible_untouched() {
        let model = model();
        let state = susceptible(1);
        let new = compute_progression_output(&model, &state, &[], 1);

        assert_eq!(new.current_state, 0);
        assert_eq!(new.next_state, NULL_STATE);
        assert_eq!(new.dwell_time, NULL_DWELL_TIME);
        assert!(new.invariant_holds());
    }

    #[test]
    fn zero_probability_never_exposes() {
        let model = model();
        let state = susceptible(1);
        let new = compute_progression_output(&model, &state, &[0.0, 0.0], 1);
        assert_eq!(new.current_state, 0);
    }

    #[test]
    fn deterministic_dwell_sequence() {
        // Scenario: exposure at tick 0, fixed dwell 3, tick_time 1.
        // E at ticks 0..2, I from tick 3 onward.
        let model = model();
        let mut state = susceptible(1);

        state = compute_progression_output(&model, &state, &[1.0], 1);
        assert_eq!(state.current_state, 1);
        assert_eq!(state.dwell_time, 2);

        state = compute_progression_output(&model, &state, &[], 1);
        assert_eq!(state.current_state, 1);
        assert_eq!(state.dwell_time, 1);

        state = compute_progression_output(&model, &state, &[], 1);
        assert_eq!(state.current_state, 1);
        assert_eq!(state.dwell_time, 0);

        state = compute_progression_output(&model, &state, &[], 1);
        assert_eq!(state.current_state, 2);
        assert_eq!(state.next_state, NULL_STATE);
        assert_eq!(state.dwell_time, NULL_DWELL_TIME);
        assert!(state.invariant_holds());
    }

    #[test]
    fn dwell_advance_clamps_at_zero() {
        let model = model();
        let state = PersonState {
            pid: 1,
            group: 0,
            current_state: 1,
            next_state: 2,
            dwell_time: 2,
            seed: 5,
        };
        let new = compute_progression_output(&model, &state, &[], 5);
        assert_eq!(new.dwell_time, 0);
        assert!(new.invariant_holds());
    }

    #[test]
    fn same_seed_same_outcome() {
        let model = model();
        let state = susceptible(9);
        let a = compute_progression_output(&model, &state, &[0.5], 1);
        let b = compute_progression_output(&model, &state, &[0.5], 1);
        assert_eq!(a, b);
    }
}
