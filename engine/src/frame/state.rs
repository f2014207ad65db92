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

use fxhash::FxHashMap;

use crate::disease::progression::PersonState;
use crate::error::{Error, Result};
use crate::frame::batch::{Column, RecordBatch};
use crate::frame::schema::Schema;
use crate::frame::Frame;
use crate::models::custom_types::{Count, Pid, Rank};

/// Person states, struct-of-arrays; lives across ticks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateFrame {
    pub pid: Vec<Pid>,
    pub group: Vec<i8>,
    pub current_state: Vec<i8>,
    pub next_state: Vec<i8>,
    pub dwell_time: Vec<i32>,
    pub seed: Vec<i64>,
}

impl StateFrame {
    pub fn new() -> StateFrame {
        StateFrame::default()
    }

    pub fn push(&mut self, row: PersonState) {
        self.pid.push(row.pid);
        self.group.push(row.group);
        self.current_state.push(row.current_state);
        self.next_state.push(row.next_state);
        self.dwell_time.push(row.dwell_time);
        self.seed.push(row.seed);
    }

    pub fn row(&self, i: usize) -> PersonState {
        PersonState {
            pid: self.pid[i],
            group: self.group[i],
            current_state: self.current_state[i],
            next_state: self.next_state[i],
            dwell_time: self.dwell_time[i],
            seed: self.seed[i],
        }
    }

    pub fn concat(parts: impl IntoIterator<Item = StateFrame>) -> StateFrame {
        let mut out = StateFrame::new();
        for part in parts {
            out.pid.extend_from_slice(&part.pid);
            out.group.extend_from_slice(&part.group);
            out.current_state.extend_from_slice(&part.current_state);
            out.next_state.extend_from_slice(&part.next_state);
            out.dwell_time.extend_from_slice(&part.dwell_time);
            out.seed.extend_from_slice(&part.seed);
        }
        out
    }

    /// pid -> row index; duplicates are corrupt input.
    pub fn pid_index(&self) -> Result<FxHashMap<Pid, usize>> {
        let mut index = FxHashMap::default();
        for (i, &pid) in self.pid.iter().enumerate() {
            if index.insert(pid, i).is_some() {
                return Err(Error::InvalidInput(format!("pid {} appears twice in a state frame", pid)));
            }
        }
        Ok(index)
    }

    /// Count of persons per disease state.
    pub fn histogram(&self, n_states: usize) -> Result<Vec<Count>> {
        let mut counts = vec![0u64; n_states];
        for &state in &self.current_state {
            let index = usize::try_from(state).ok().filter(|&s| s < n_states).ok_or_else(|| {
                Error::InvalidInput(format!("current_state {} is outside the model's states", state))
            })?;
            counts[index] += 1;
        }
        Ok(counts)
    }

    pub fn scatter(&self, pid_rank: &FxHashMap<Pid, Rank>, n_ranks: usize) -> Result<Vec<StateFrame>> {
        let mut shares = vec![StateFrame::new(); n_ranks];
        for i in 0..self.len() {
            let rank = *pid_rank.get(&self.pid[i]).ok_or_else(|| {
                Error::InvalidInput(format!("pid {} is not in the person partition table", self.pid[i]))
            })?;
            shares[rank].push(self.row(i));
        }
        Ok(shares)
    }
}

impl Frame for StateFrame {
    fn len(&self) -> usize {
        self.pid.len()
    }

    fn to_batch(&self, schema: &Schema) -> Result<RecordBatch> {
        RecordBatch::new(
            schema.clone(),
            vec![
                Column::Int64(self.pid.clone()),
                Column::Int8(self.group.clone()),
                Column::Int8(self.current_state.clone()),
                Column::Int8(self.next_state.clone()),
                Column::Int32(self.dwell_time.clone()),
                Column::Int64(self.seed.clone()),
            ],
        )
    }

    fn from_batch(batch: RecordBatch) -> Result<StateFrame> {
        let mut iter = batch.columns.into_iter();
        let mut next = |name: &str| {
            iter.next()
                .ok_or_else(|| Error::Transport(format!("state batch is missing column {}", name)))
        };
        Ok(StateFrame {
            pid: next("pid")?.into_i64()?,
            group: next("group")?.into_i8()?,
            current_state: next("current_state")?.into_i8()?,
            next_state: next("next_state")?.into_i8()?,
            dwell_time: next("dwell_time")?.into_i32()?,
            seed: next("seed")?.into_i64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::schema::state_schema;
    use crate::models::constants::{NULL_DWELL_TIME, NULL_STATE};

    fn person(pid: Pid, state: i8) -> PersonState {
        PersonState {
            pid,
            group: 0,
            current_state: state,
            next_state: NULL_STATE,
            dwell_time: NULL_DWELL_TIME,
            seed: pid * 31,
        }
    }

    #[test]
    fn round_trip_preserves_cells() {
        let mut frame = StateFrame::new();
        frame.push(person(1, 0));
        frame.push(person(2, 2));
        let bytes = frame.to_batch(&state_schema()).unwrap().encode().unwrap();
        let back =
            StateFrame::from_batch(RecordBatch::decode(&bytes, &state_schema()).unwrap()).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn histogram_counts_every_person() {
        let mut frame = StateFrame::new();
        frame.push(person(1, 0));
        frame.push(person(2, 0));
        frame.push(person(3, 2));
        let hist = frame.histogram(3).unwrap();
        assert_eq!(hist, vec![2, 0, 1]);
        assert_eq!(hist.iter().sum::<u64>(), frame.len() as u64);
    }

    #[test]
    fn histogram_rejects_out_of_range_state() {
        let mut frame = StateFrame::new();
        frame.push(person(1, 5));
        assert!(matches!(frame.histogram(3), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn pid_index_rejects_duplicates() {
        let mut frame = StateFrame::new();
        frame.push(person(1, 0));
        frame.push(person(1, 0));
        assert!(matches!(frame.pid_index(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn scatter_routes_by_pid() {
        let mut frame = StateFrame::new();
        frame.push(person(1, 0));
        frame.push(person(2, 0));
        let mut pid_rank = FxHashMap::default();
        pid_rank.insert(1, 0usize);
        pid_rank.insert(2, 1usize);
        let shares = frame.scatter(&pid_rank, 2).unwrap();
        assert_eq!(shares[0].pid, vec![1]);
        assert_eq!(shares[1].pid, vec![2]);
    }
}
