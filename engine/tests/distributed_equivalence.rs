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

//! End-to-end check that the single-process reference run and the
//! multi-rank run produce identical epicurves. The model is fully
//! deterministic (0/1 probabilities, fixed dwell times), so floating-point
//! accumulation order cannot blur the comparison.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use pansim::config::SimConfig;
use pansim::partition::{partition_visit_files, write_lid_partition, write_pid_partition};
use pansim::Simulation;

const MODEL: &str = r#"
states: [S, E, I, R]
groups: [adult, child]
behaviors: [base]
susceptibility:
  S: {adult: 1.0, child: 1.0}
infectivity:
  I: {adult: 1.0, child: 1.0}
behavior_modifier:
  base: {base: 1.0}
progression:
  E:
    adult: {I: 1.0}
    child: {I: 1.0}
  I:
    adult: {R: 1.0}
    child: {R: 1.0}
distribution:
  d2: {dist: fixed, value: 2}
  d3: {dist: fixed, value: 3}
dwell_time:
  E:
    adult: {I: d2}
    child: {I: d2}
  I:
    adult: {R: d3}
    child: {R: d3}
unit_time: 1.0
exposed_state: E
"#;

struct Fixture {
    _dir: TempDir,
    config: SimConfig,
}

fn write_fixture(n_nodes: usize, cpus_per_node: usize) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = |name: &str| dir.path().join(name);

    fs::write(path("model.yaml"), MODEL).unwrap();

    // Person 1 starts infectious; everyone shares a full-tick visit with
    // three others at one of two locations.
    let mut start = String::from("pid,group,start_state\n");
    for pid in 1..=8 {
        let group = (pid - 1) % 2;
        let state = if pid == 1 { 2 } else { 0 };
        start.push_str(&format!("{},{},{}\n", pid, group, state));
    }
    fs::write(path("start.csv"), start).unwrap();

    let mut visits = String::from("lid,pid,start_time,end_time,mask\n");
    for pid in 1..=8 {
        let lid = if pid <= 4 { 100 } else { 200 };
        let mask = pid % 2;
        visits.push_str(&format!("{},{},0,10,{}\n", lid, pid, mask));
    }
    fs::write(path("visits_0.csv"), visits).unwrap();

    let (lid_records, pid_records) =
        partition_visit_files(&[path("visits_0.csv")], n_nodes, cpus_per_node).unwrap();
    write_lid_partition(&path("lid.csv"), &lid_records).unwrap();
    write_pid_partition(&path("pid.csv"), &pid_records).unwrap();

    let config = SimConfig {
        seed: 42,
        tick_time: 1,
        num_ticks: 8,
        visual_attributes: vec!["mask".to_string()],
        disease_model_file: path("model.yaml"),
        start_state_file: path("start.csv"),
        visit_files: vec![path("visits_0.csv")],
        lid_partition: path("lid.csv"),
        pid_partition: path("pid.csv"),
        output_file: PathBuf::new(),
        per_node_behavior: false,
        start_exposed_seed: None,
        tick_exposed_seed: None,
    };
    Fixture { _dir: dir, config }
}

const EXPECTED: &str = "S,E,I,R\n\
                        4,3,1,0\n\
                        4,3,1,0\n\
                        4,0,4,0\n\
                        4,0,3,1\n\
                        4,0,3,1\n\
                        4,0,3,1\n\
                        4,0,0,4\n\
                        4,0,0,4\n";

#[test]
fn simple_run_matches_expected_epicurve() {
    let mut fixture = write_fixture(2, 2);
    fixture.config.output_file = fixture._dir.path().join("simple.csv");
    Simulation::new(fixture.config.clone()).run_simple().unwrap();

    let text = fs::read_to_string(&fixture.config.output_file).unwrap();
    assert_eq!(text, EXPECTED);

    // Population is conserved on every row.
    for line in text.lines().skip(1) {
        let total: u64 = line.split(',').map(|cell| cell.parse::<u64>().unwrap()).sum();
        assert_eq!(total, 8);
    }
}

#[tokio::test]
async fn distributed_run_matches_simple_run() {
    let mut fixture = write_fixture(2, 2);

    fixture.config.output_file = fixture._dir.path().join("simple.csv");
    Simulation::new(fixture.config.clone()).run_simple().unwrap();
    let simple = fs::read_to_string(&fixture.config.output_file).unwrap();

    fixture.config.output_file = fixture._dir.path().join("dist.csv");
    Simulation::new(fixture.config.clone()).run_distributed().await.unwrap();
    let dist = fs::read_to_string(&fixture.config.output_file).unwrap();

    assert_eq!(simple, dist);
    assert_eq!(dist, EXPECTED);
}

#[tokio::test]
async fn single_rank_distributed_run_matches() {
    let mut fixture = write_fixture(1, 1);
    fixture.config.output_file = fixture._dir.path().join("dist.csv");
    Simulation::new(fixture.config.clone()).run_distributed().await.unwrap();
    let dist = fs::read_to_string(&fixture.config.output_file).unwrap();
    assert_eq!(dist, EXPECTED);
}

#[tokio::test]
async fn per_node_behavior_matches() {
    let mut fixture = write_fixture(2, 2);
    fixture.config.per_node_behavior = true;
    fixture.config.output_file = fixture._dir.path().join("dist_pn.csv");
    Simulation::new(fixture.config.clone()).run_distributed().await.unwrap();
    let dist = fs::read_to_string(&fixture.config.output_file).unwrap();
    assert_eq!(dist, EXPECTED);
}
