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

//! Read-only per-job context: the disease model, the wire schemas, and the
//! partition tables, loaded once and shared by reference afterwards.

use fxhash::FxHashMap;

use crate::config::SimConfig;
use crate::disease::model::DiseaseModel;
use crate::error::{Error, Result};
use crate::frame::{state_schema, visit_output_schema, visit_schema, Schema};
use crate::models::custom_types::{Lid, Pid, Rank};
use crate::partition::{LidPartitionRecord, PidPartitionRecord};

pub struct ConfigContext {
    pub disease_model: DiseaseModel,
    pub attr_names: Vec<String>,
    pub visit_schema: Schema,
    pub visit_output_schema: Schema,
    pub state_schema: Schema,
    pub lid_rank: FxHashMap<Lid, Rank>,
    pub pid_prog_rank: FxHashMap<Pid, Rank>,
    pub pid_behav_rank: FxHashMap<Pid, Rank>,
    /// Ranks hosting a behavior actor, ascending.
    pub behav_ranks: Vec<Rank>,
    pub n_nodes: usize,
    pub cpus_per_node: usize,
    pub n_ranks: usize,
    pub tick_time: i32,
    pub seed: i64,
}

impl ConfigContext {
    pub fn load(config: &SimConfig) -> Result<ConfigContext> {
        let disease_model = DiseaseModel::load(&config.disease_model_file)?;
        let attr_names = config.visual_attributes.clone();

        let mut reader = csv::Reader::from_path(&config.lid_partition)?;
        let lid_parts: Vec<LidPartitionRecord> =
            reader.deserialize().collect::<std::result::Result<_, _>>()?;
        let mut reader = csv::Reader::from_path(&config.pid_partition)?;
        let pid_parts: Vec<PidPartitionRecord> =
            reader.deserialize().collect::<std::result::Result<_, _>>()?;

        // The world size is implied by the partition tables.
        let n_nodes = lid_parts
            .iter()
            .map(|r| r.node)
            .chain(pid_parts.iter().map(|r| r.node))
            .max()
            .map_or(1, |max| max as usize + 1);
        let cpus_per_node = lid_parts
            .iter()
            .map(|r| r.cpu)
            .chain(pid_parts.iter().map(|r| r.cpu))
            .max()
            .map_or(1, |max| max as usize + 1);
        let n_ranks = n_nodes * cpus_per_node;

        let rank_of = |node: u32, cpu: u32| node as usize * cpus_per_node + cpu as usize;

        let mut lid_rank = FxHashMap::default();
        for record in &lid_parts {
            if lid_rank.insert(record.lid, rank_of(record.node, record.cpu)).is_some() {
                return Err(Error::InvalidInput(format!(
                    "lid {} appears twice in the location partition table",
                    record.lid
                )));
            }
        }
        let mut pid_prog_rank = FxHashMap::default();
        for record in &pid_parts {
            if pid_prog_rank.insert(record.pid, rank_of(record.node, record.cpu)).is_some() {
                return Err(Error::InvalidInput(format!(
                    "pid {} appears twice in the person partition table",
                    record.pid
                )));
            }
        }

        let (pid_behav_rank, behav_ranks) = if config.per_node_behavior {
            // One behavior actor per node, on cpu 0.
            let behav: FxHashMap<Pid, Rank> = pid_parts
                .iter()
                .map(|record| (record.pid, rank_of(record.node, 0)))
                .collect();
            let ranks: Vec<Rank> = (0..n_nodes).map(|node| node * cpus_per_node).collect();
            (behav, ranks)
        } else {
            (pid_prog_rank.clone(), (0..n_ranks).collect())
        };

        Ok(ConfigContext {
            disease_model,
            attr_names,
            visit_schema: visit_schema(&config.visual_attributes)?,
            visit_output_schema: visit_output_schema(&config.visual_attributes)?,
            state_schema: state_schema(),
            lid_rank,
            pid_prog_rank,
            pid_behav_rank,
            behav_ranks,
            n_nodes,
            cpus_per_node,
            n_ranks,
            tick_time: config.tick_time,
            seed: config.seed,
        })
    }

    pub fn n_attrs(&self) -> usize {
        self.attr_names.len()
    }

    pub fn behav_count(&self) -> usize {
        self.behav_ranks.len()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const MODEL: &str = r#"
states: [S, E, I]
groups: [adult]
behaviors: [base]
susceptibility:
  S: {adult: 1.0}
infectivity:
  I: {adult: 1.0}
progression: {}
distribution: {}
dwell_time: {}
unit_time: 1.0
exposed_state: E
"#;

    fn write_fixture(dir: &TempDir, per_node_behavior: bool) -> SimConfig {
        fs::write(dir.path().join("model.yaml"), MODEL).unwrap();
        fs::write(dir.path().join("lid.csv"), "lid,node,cpu\n1,0,0\n2,1,1\n").unwrap();
        fs::write(dir.path().join("pid.csv"), "pid,node,cpu\n10,0,1\n11,1,0\n").unwrap();

        SimConfig {
            seed: 1,
            tick_time: 1,
            num_ticks: 1,
            visual_attributes: vec!["mask".to_string()],
            disease_model_file: dir.path().join("model.yaml"),
            start_state_file: dir.path().join("start.csv"),
            visit_files: vec![dir.path().join("visits.csv")],
            lid_partition: dir.path().join("lid.csv"),
            pid_partition: dir.path().join("pid.csv"),
            output_file: dir.path().join("out.csv"),
            per_node_behavior,
            start_exposed_seed: None,
            tick_exposed_seed: None,
        }
    }

    #[test]
    fn derives_topology_from_partition_tables() {
        let dir = TempDir::new().unwrap();
        let config = write_fixture(&dir, false);
        let ctx = ConfigContext::load(&config).unwrap();

        assert_eq!(ctx.n_nodes, 2);
        assert_eq!(ctx.cpus_per_node, 2);
        assert_eq!(ctx.n_ranks, 4);
        assert_eq!(ctx.lid_rank[&1], 0);
        assert_eq!(ctx.lid_rank[&2], 3);
        assert_eq!(ctx.pid_prog_rank[&10], 1);
        assert_eq!(ctx.behav_ranks, vec![0, 1, 2, 3]);
        assert_eq!(ctx.pid_behav_rank, ctx.pid_prog_rank);
    }

    #[test]
    fn per_node_behavior_pins_cpu_zero() {
        let dir = TempDir::new().unwrap();
        let config = write_fixture(&dir, true);
        let ctx = ConfigContext::load(&config).unwrap();

        assert_eq!(ctx.behav_ranks, vec![0, 2]);
        assert_eq!(ctx.pid_behav_rank[&10], 0);
        assert_eq!(ctx.pid_behav_rank[&11], 2);
    }
}
