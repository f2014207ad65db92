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

//! One-shot assignment of locations and persons to node/cpu partitions.
//! Locations are placed greedily in descending weight onto the least loaded
//! partition; each person follows the plurality of their locations.

use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

use fxhash::FxHashMap;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::custom_types::{Lid, Pid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LidPartitionRecord {
    pub lid: Lid,
    pub node: u32,
    pub cpu: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidPartitionRecord {
    pub pid: Pid,
    pub node: u32,
    pub cpu: u32,
}

/// Cumulative weight of one partition; the heap pops the least loaded,
/// breaking ties on the partition id.
#[derive(Debug, PartialEq)]
struct PartLoad {
    load: f64,
    part: usize,
}

impl Eq for PartLoad {}

impl Ord for PartLoad {
    fn cmp(&self, other: &Self) -> Ordering {
        self.load.total_cmp(&other.load).then(self.part.cmp(&other.part))
    }
}

impl PartialOrd for PartLoad {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sorting events per location is O(n log n); the weight reflects that.
fn location_weight(n_visitors: usize) -> f64 {
    let n = n_visitors as f64;
    n * (n + 1.0).log2()
}

pub fn do_partition(
    visits: &[(Lid, Pid)],
    n_nodes: usize,
    cpus_per_node: usize,
) -> Result<(Vec<LidPartitionRecord>, Vec<PidPartitionRecord>)> {
    if n_nodes == 0 || cpus_per_node == 0 {
        return Err(Error::Config(format!(
            "cannot partition onto {} nodes x {} cpus",
            n_nodes, cpus_per_node
        )));
    }
    let n_parts = n_nodes * cpus_per_node;

    let mut lid_pids: FxHashMap<Lid, Vec<Pid>> = FxHashMap::default();
    let mut pid_lids: FxHashMap<Pid, Vec<Lid>> = FxHashMap::default();
    for &(lid, pid) in visits {
        let pids = lid_pids.entry(lid).or_default();
        if !pids.contains(&pid) {
            pids.push(pid);
        }
        // First-seen order matters for the plurality tie-break below.
        let lids = pid_lids.entry(pid).or_default();
        if !lids.contains(&lid) {
            lids.push(lid);
        }
    }

    let mut weighted: Vec<(Lid, f64)> = lid_pids
        .iter()
        .map(|(&lid, pids)| (lid, location_weight(pids.len())))
        .collect();
    weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut heap: BinaryHeap<Reverse<PartLoad>> = (0..n_parts)
        .map(|part| Reverse(PartLoad { load: 0.0, part }))
        .collect();
    let mut lid_part: FxHashMap<Lid, usize> = FxHashMap::default();
    for (lid, weight) in weighted {
        let Reverse(PartLoad { load, part }) = heap.pop().expect("partition heap is never empty");
        lid_part.insert(lid, part);
        heap.push(Reverse(PartLoad { load: load + weight, part }));
    }

    let mut lids: Vec<Lid> = lid_pids.keys().copied().collect();
    lids.sort_unstable();
    let lid_records: Vec<LidPartitionRecord> = lids
        .iter()
        .map(|&lid| {
            let part = lid_part[&lid];
            LidPartitionRecord {
                lid,
                node: (part / cpus_per_node) as u32,
                cpu: (part % cpus_per_node) as u32,
            }
        })
        .collect();

    let mut pids: Vec<Pid> = pid_lids.keys().copied().collect();
    pids.sort_unstable();
    let pid_records: Vec<PidPartitionRecord> = pids
        .iter()
        .map(|&pid| {
            // Modal partition over this person's locations, first seen wins
            // ties.
            let mut tally: Vec<(usize, usize)> = Vec::new();
            for lid in &pid_lids[&pid] {
                let part = lid_part[lid];
                match tally.iter_mut().find(|(p, _)| *p == part) {
                    Some((_, count)) => *count += 1,
                    None => tally.push((part, 1)),
                }
            }
            let mut best = tally[0];
            for &(part, count) in &tally[1..] {
                if count > best.1 {
                    best = (part, count);
                }
            }
            let (part, _) = best;
            PidPartitionRecord {
                pid,
                node: (part / cpus_per_node) as u32,
                cpu: (part % cpus_per_node) as u32,
            }
        })
        .collect();

    Ok((lid_records, pid_records))
}

/// Read the (lid, pid) pairs of a visit schedule file, ignoring the other
/// columns.
pub fn read_visit_pairs(path: &Path) -> Result<Vec<(Lid, Pid)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let lid_col = headers
        .iter()
        .position(|h| h == "lid")
        .ok_or_else(|| Error::InvalidInput(format!("{}: no lid column", path.display())))?;
    let pid_col = headers
        .iter()
        .position(|h| h == "pid")
        .ok_or_else(|| Error::InvalidInput(format!("{}: no pid column", path.display())))?;

    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let lid: Lid = record
            .get(lid_col)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| Error::InvalidInput(format!("{}: bad lid value", path.display())))?;
        let pid: Pid = record
            .get(pid_col)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| Error::InvalidInput(format!("{}: bad pid value", path.display())))?;
        pairs.push((lid, pid));
    }
    Ok(pairs)
}

/// Partition the union of the given visit schedule files.
pub fn partition_visit_files(
    visit_files: &[std::path::PathBuf],
    n_nodes: usize,
    cpus_per_node: usize,
) -> Result<(Vec<LidPartitionRecord>, Vec<PidPartitionRecord>)> {
    let mut pairs = Vec::new();
    for path in visit_files {
        info!("reading visits from {}", path.display());
        pairs.extend(read_visit_pairs(path)?);
    }
    do_partition(&pairs, n_nodes, cpus_per_node)
}

pub fn write_lid_partition(path: &Path, records: &[LidPartitionRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_pid_partition(path: &Path, records: &[PidPartitionRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn rank(record: &LidPartitionRecord, cpus: u32) -> u32 {
        record.node * cpus + record.cpu
    }

    #[test]
    fn heavy_locations_spread_over_partitions() {
        // Location 1 has 3 visitors, 2 and 3 have one each.
        let visits = vec![(1, 10), (1, 11), (1, 12), (2, 13), (3, 14)];
        let (lid_records, _) = do_partition(&visits, 1, 2).unwrap();

        assert_eq!(lid_records.len(), 3);
        let heavy = lid_records.iter().find(|r| r.lid == 1).unwrap();
        let light: Vec<_> = lid_records.iter().filter(|r| r.lid != 1).collect();
        // The two light locations land together, opposite the heavy one.
        assert_eq!(light[0].cpu, light[1].cpu);
        assert_ne!(heavy.cpu, light[0].cpu);
    }

    #[test]
    fn persons_follow_their_modal_location() {
        let visits = vec![
            (1, 10),
            (1, 11),
            (1, 12),
            (2, 13),
            (3, 13),
            (2, 10),
        ];
        let (lid_records, pid_records) = do_partition(&visits, 1, 2).unwrap();

        let lid_rank: FxHashMap<Lid, u32> =
            lid_records.iter().map(|r| (r.lid, rank(r, 2))).collect();
        let pid10 = pid_records.iter().find(|r| r.pid == 10).unwrap();
        // pid 10 visits lids 1 and 2; the tie goes to the first seen, lid 1.
        assert_eq!(pid10.node * 2 + pid10.cpu, lid_rank[&1]);
    }

    #[test]
    fn partitioning_is_idempotent() {
        let visits = vec![(1, 10), (1, 11), (2, 12), (3, 13), (4, 10), (5, 12), (5, 14)];
        let a = do_partition(&visits, 2, 2).unwrap();
        let b = do_partition(&visits, 2, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn every_id_is_covered() {
        let visits = vec![(1, 10), (2, 11), (3, 12), (4, 13)];
        let (lid_records, pid_records) = do_partition(&visits, 2, 2).unwrap();
        assert_eq!(lid_records.len(), 4);
        assert_eq!(pid_records.len(), 4);
        for r in &lid_records {
            assert!(r.node < 2 && r.cpu < 2);
        }
        for r in &pid_records {
            assert!(r.node < 2 && r.cpu < 2);
        }
    }

    #[test]
    fn rejects_empty_topology() {
        assert!(matches!(do_partition(&[], 0, 2), Err(Error::Config(_))));
    }

    #[test]
    fn csv_round_trip() {
        let dir = TempDir::new().unwrap();
        let visit_path = dir.path().join("visits.csv");
        std::fs::write(&visit_path, "lid,pid,start_time,end_time\n1,10,0,5\n2,11,0,5\n").unwrap();

        let pairs = read_visit_pairs(&visit_path).unwrap();
        assert_eq!(pairs, vec![(1, 10), (2, 11)]);

        let (lid_records, pid_records) = do_partition(&pairs, 1, 2).unwrap();
        let lid_path = dir.path().join("lid.csv");
        let pid_path = dir.path().join("pid.csv");
        write_lid_partition(&lid_path, &lid_records).unwrap();
        write_pid_partition(&pid_path, &pid_records).unwrap();

        let mut reader = csv::Reader::from_path(&lid_path).unwrap();
        let back: Vec<LidPartitionRecord> =
            reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(back, lid_records);
    }
}
