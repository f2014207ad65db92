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

//! Reference behavior model: replays pre-supplied per-tick visit schedules,
//! cycling over the files, and refreshes each visit's state and group from
//! the newest state frame. It never looks at the visit outputs.

use std::path::Path;

use fxhash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::behavior::BehaviorModel;
use crate::config::SimConfig;
use crate::disease::progression::PersonState;
use crate::error::{Error, Result};
use crate::frame::{StateFrame, VisitFrame, VisitOutputFrame};
use crate::models::constants::{NULL_DWELL_TIME, NULL_STATE};
use crate::models::custom_types::{Lid, Pid};

#[derive(Debug, Deserialize)]
struct StartStateRecord {
    pid: Pid,
    group: i8,
    start_state: i8,
}

/// A visit schedule file as read from disk; state, group and behavior are
/// filled in per tick.
#[derive(Debug, Clone)]
pub(crate) struct RawVisits {
    lid: Vec<Lid>,
    pid: Vec<Pid>,
    start_time: Vec<i32>,
    end_time: Vec<i32>,
    attrs: Vec<Vec<i8>>,
}

/// Initial seeds are a pure function of (master seed, pid), so sharding the
/// population across behavior ranks cannot perturb anyone's stream.
pub fn initial_seed(master_seed: i64, pid: Pid) -> i64 {
    fxhash::hash64(&(master_seed, pid)) as i64
}

pub(crate) fn read_start_state(
    path: &Path,
    master_seed: i64,
    pids: Option<&FxHashSet<Pid>>,
) -> Result<StateFrame> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut frame = StateFrame::new();
    for record in reader.deserialize() {
        let record: StartStateRecord = record?;
        if let Some(filter) = pids {
            if !filter.contains(&record.pid) {
                continue;
            }
        }
        frame.push(PersonState {
            pid: record.pid,
            group: record.group,
            current_state: record.start_state,
            next_state: NULL_STATE,
            dwell_time: NULL_DWELL_TIME,
            seed: initial_seed(master_seed, record.pid),
        });
    }
    Ok(frame)
}

fn column_position(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn parse_cell<T: std::str::FromStr>(record: &csv::StringRecord, col: usize, path: &Path) -> Result<T> {
    record
        .get(col)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| Error::InvalidInput(format!("{}: unparsable cell in column {}", path.display(), col)))
}

pub(crate) fn read_visits(
    path: &Path,
    attr_names: &[String],
    pids: Option<&FxHashSet<Pid>>,
) -> Result<RawVisits> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let lid_col = column_position(&headers, "lid")
        .ok_or_else(|| Error::InvalidInput(format!("{}: no lid column", path.display())))?;
    let pid_col = column_position(&headers, "pid")
        .ok_or_else(|| Error::InvalidInput(format!("{}: no pid column", path.display())))?;
    let start_col = column_position(&headers, "start_time")
        .ok_or_else(|| Error::InvalidInput(format!("{}: no start_time column", path.display())))?;
    let end_col = column_position(&headers, "end_time")
        .ok_or_else(|| Error::InvalidInput(format!("{}: no end_time column", path.display())))?;
    // Attribute columns default to zero when a schedule file lacks them.
    let attr_cols: Vec<Option<usize>> =
        attr_names.iter().map(|name| column_position(&headers, name)).collect();

    let mut visits = RawVisits {
        lid: Vec::new(),
        pid: Vec::new(),
        start_time: Vec::new(),
        end_time: Vec::new(),
        attrs: vec![Vec::new(); attr_names.len()],
    };
    for record in reader.records() {
        let record = record?;
        let pid: Pid = parse_cell(&record, pid_col, path)?;
        if let Some(filter) = pids {
            if !filter.contains(&pid) {
                continue;
            }
        }
        let start_time: i32 = parse_cell(&record, start_col, path)?;
        let end_time: i32 = parse_cell(&record, end_col, path)?;
        if start_time < 0 || start_time > end_time {
            return Err(Error::InvalidInput(format!(
                "{}: visit of pid {} has interval [{}, {}]",
                path.display(),
                pid,
                start_time,
                end_time
            )));
        }
        visits.lid.push(parse_cell(&record, lid_col, path)?);
        visits.pid.push(pid);
        visits.start_time.push(start_time);
        visits.end_time.push(end_time);
        for (column, col) in visits.attrs.iter_mut().zip(&attr_cols) {
            column.push(match col {
                Some(c) => parse_cell(&record, *c, path)?,
                None => 0,
            });
        }
    }
    Ok(visits)
}

/// Fill a visit frame from a schedule, stamping each visit with the
/// visitor's current state and group.
fn setup_visits(raw: &RawVisits, state: &StateFrame) -> Result<VisitFrame> {
    let pid_index = state.pid_index()?;
    let n_attrs = raw.attrs.len();
    let mut frame = VisitFrame::new(n_attrs);
    let mut attr_row = vec![0i8; n_attrs];
    for i in 0..raw.lid.len() {
        let pid = raw.pid[i];
        let row = *pid_index.get(&pid).ok_or_else(|| {
            Error::InvalidInput(format!("visit references pid {} with no state row", pid))
        })?;
        for (cell, column) in attr_row.iter_mut().zip(&raw.attrs) {
            *cell = column[i];
        }
        frame.push(
            raw.lid[i],
            pid,
            state.group[row],
            state.current_state[row],
            0,
            raw.start_time[i],
            raw.end_time[i],
            &attr_row,
        );
    }
    Ok(frame)
}

pub struct ReplayBehavior {
    raw_visits: Vec<RawVisits>,
    next_tick: usize,
    next_state: StateFrame,
    next_visits: VisitFrame,
}

impl ReplayBehavior {
    pub fn new(config: &SimConfig, pids: Option<FxHashSet<Pid>>) -> Result<ReplayBehavior> {
        if config.visit_files.is_empty() {
            return Err(Error::Config("no visit schedule files given".to_string()));
        }
        let filter = pids.as_ref();
        let next_state = read_start_state(&config.start_state_file, config.seed, filter)?;
        let mut raw_visits = Vec::with_capacity(config.visit_files.len());
        for path in &config.visit_files {
            raw_visits.push(read_visits(path, &config.visual_attributes, filter)?);
        }
        let next_visits = setup_visits(&raw_visits[0], &next_state)?;
        Ok(ReplayBehavior { raw_visits, next_tick: 0, next_state, next_visits })
    }

    pub(crate) fn next_state_mut(&mut self) -> &mut StateFrame {
        &mut self.next_state
    }

    /// Rebuild the pending visit frame after the state frame was edited.
    pub(crate) fn resync_visits(&mut self) -> Result<()> {
        let idx = self.next_tick % self.raw_visits.len();
        self.next_visits = setup_visits(&self.raw_visits[idx], &self.next_state)?;
        Ok(())
    }
}

impl BehaviorModel for ReplayBehavior {
    fn next_state(&self) -> &StateFrame {
        &self.next_state
    }

    fn next_visits(&self) -> &VisitFrame {
        &self.next_visits
    }

    fn run(&mut self, new_state: StateFrame, _visit_output: VisitOutputFrame) -> Result<()> {
        self.next_tick += 1;
        self.next_state = new_state;
        self.resync_visits()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;
    use crate::frame::Frame;

    fn config_in(dir: &TempDir, visit_files: Vec<PathBuf>) -> SimConfig {
        SimConfig {
            seed: 7,
            tick_time: 1,
            num_ticks: 2,
            visual_attributes: vec!["mask".to_string()],
            disease_model_file: dir.path().join("model.yaml"),
            start_state_file: dir.path().join("start.csv"),
            visit_files,
            lid_partition: dir.path().join("lid.csv"),
            pid_partition: dir.path().join("pid.csv"),
            output_file: dir.path().join("out.csv"),
            per_node_behavior: false,
            start_exposed_seed: None,
            tick_exposed_seed: None,
        }
    }

    fn write_fixture(dir: &TempDir) -> SimConfig {
        fs::write(
            dir.path().join("start.csv"),
            "pid,group,start_state\n1,0,0\n2,1,2\n",
        )
        .unwrap();
        let v0 = dir.path().join("visits_0.csv");
        let v1 = dir.path().join("visits_1.csv");
        fs::write(&v0, "lid,pid,start_time,end_time,mask\n5,1,0,10,1\n5,2,0,10,0\n").unwrap();
        // The second schedule has no mask column.
        fs::write(&v1, "lid,pid,start_time,end_time\n6,1,2,8\n").unwrap();
        config_in(dir, vec![v0, v1])
    }

    #[test]
    fn stamps_visits_from_the_state_frame() {
        let dir = TempDir::new().unwrap();
        let config = write_fixture(&dir);
        let behavior = ReplayBehavior::new(&config, None).unwrap();

        let visits = behavior.next_visits();
        assert_eq!(visits.len(), 2);
        assert_eq!(visits.state, vec![0, 2]);
        assert_eq!(visits.group, vec![0, 1]);
        assert_eq!(visits.behavior, vec![0, 0]);
        assert_eq!(visits.attrs[0], vec![1, 0]);

        let state = behavior.next_state();
        assert_eq!(state.next_state, vec![NULL_STATE; 2]);
        assert_eq!(state.dwell_time, vec![NULL_DWELL_TIME; 2]);
        assert_eq!(state.seed[0], initial_seed(7, 1));
    }

    #[test]
    fn cycles_visit_files_and_restamps_state() {
        let dir = TempDir::new().unwrap();
        let config = write_fixture(&dir);
        let mut behavior = ReplayBehavior::new(&config, None).unwrap();

        let mut progressed = behavior.next_state().clone();
        progressed.current_state[0] = 1;
        behavior.run(progressed, VisitOutputFrame::new(1)).unwrap();

        let visits = behavior.next_visits();
        assert_eq!(visits.lid, vec![6]);
        assert_eq!(visits.state, vec![1]);
        // Missing attribute column reads as zero.
        assert_eq!(visits.attrs[0], vec![0]);

        // Third tick wraps back to the first schedule.
        let progressed = behavior.next_state().clone();
        behavior.run(progressed, VisitOutputFrame::new(1)).unwrap();
        assert_eq!(behavior.next_visits().lid, vec![5, 5]);
    }

    #[test]
    fn pid_filter_restricts_both_frames() {
        let dir = TempDir::new().unwrap();
        let config = write_fixture(&dir);
        let mut pids = FxHashSet::default();
        pids.insert(2);
        let behavior = ReplayBehavior::new(&config, Some(pids)).unwrap();

        assert_eq!(behavior.next_state().pid, vec![2]);
        assert_eq!(behavior.next_visits().pid, vec![2]);
    }

    #[test]
    fn rejects_inverted_visit_interval() {
        let dir = TempDir::new().unwrap();
        let mut config = write_fixture(&dir);
        let bad = dir.path().join("bad.csv");
        fs::write(&bad, "lid,pid,start_time,end_time\n5,1,9,3\n").unwrap();
        config.visit_files = vec![bad];
        assert!(matches!(
            ReplayBehavior::new(&config, None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_visit_without_state_row() {
        let dir = TempDir::new().unwrap();
        let mut config = write_fixture(&dir);
        let orphan = dir.path().join("orphan.csv");
        fs::write(&orphan, "lid,pid,start_time,end_time\n5,99,0,5\n").unwrap();
        config.visit_files = vec![orphan];
        assert!(matches!(
            ReplayBehavior::new(&config, None),
            Err(Error::InvalidInput(_))
        ));
    }
}
