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

use std::ops::Range;

use fxhash::FxHashMap;

use crate::disease::transmission::VisitColumns;
use crate::error::{Error, Result};
use crate::frame::batch::{Column, RecordBatch};
use crate::frame::schema::Schema;
use crate::frame::Frame;
use crate::models::custom_types::{Lid, Pid, Rank};

/// One tick's visits, struct-of-arrays; `attrs` holds one `i8` column per
/// visual attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitFrame {
    pub lid: Vec<Lid>,
    pub pid: Vec<Pid>,
    pub group: Vec<i8>,
    pub state: Vec<i8>,
    pub behavior: Vec<i8>,
    pub start_time: Vec<i32>,
    pub end_time: Vec<i32>,
    pub attrs: Vec<Vec<i8>>,
}

impl VisitFrame {
    pub fn new(n_attrs: usize) -> VisitFrame {
        VisitFrame { attrs: vec![Vec::new(); n_attrs], ..VisitFrame::default() }
    }

    pub fn n_attrs(&self) -> usize {
        self.attrs.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        lid: Lid,
        pid: Pid,
        group: i8,
        state: i8,
        behavior: i8,
        start_time: i32,
        end_time: i32,
        attrs: &[i8],
    ) {
        self.lid.push(lid);
        self.pid.push(pid);
        self.group.push(group);
        self.state.push(state);
        self.behavior.push(behavior);
        self.start_time.push(start_time);
        self.end_time.push(end_time);
        for (column, &value) in self.attrs.iter_mut().zip(attrs) {
            column.push(value);
        }
    }

    fn push_row_from(&mut self, other: &VisitFrame, i: usize) {
        self.lid.push(other.lid[i]);
        self.pid.push(other.pid[i]);
        self.group.push(other.group[i]);
        self.state.push(other.state[i]);
        self.behavior.push(other.behavior[i]);
        self.start_time.push(other.start_time[i]);
        self.end_time.push(other.end_time[i]);
        for (column, source) in self.attrs.iter_mut().zip(&other.attrs) {
            column.push(source[i]);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for i in 0..self.len() {
            if self.start_time[i] < 0 || self.start_time[i] > self.end_time[i] {
                return Err(Error::InvalidInput(format!(
                    "visit of pid {} at lid {} has interval [{}, {}]",
                    self.pid[i], self.lid[i], self.start_time[i], self.end_time[i]
                )));
            }
        }
        Ok(())
    }

    pub fn concat(n_attrs: usize, parts: impl IntoIterator<Item = VisitFrame>) -> VisitFrame {
        let mut out = VisitFrame::new(n_attrs);
        for part in parts {
            out.lid.extend_from_slice(&part.lid);
            out.pid.extend_from_slice(&part.pid);
            out.group.extend_from_slice(&part.group);
            out.state.extend_from_slice(&part.state);
            out.behavior.extend_from_slice(&part.behavior);
            out.start_time.extend_from_slice(&part.start_time);
            out.end_time.extend_from_slice(&part.end_time);
            for (column, source) in out.attrs.iter_mut().zip(&part.attrs) {
                column.extend_from_slice(source);
            }
        }
        out
    }

    /// Stable sort of all columns by lid, so equal lids form one contiguous
    /// run in the original row order.
    pub fn sort_by_lid(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.lid[i]);

        let mut sorted = VisitFrame::new(self.n_attrs());
        for &i in &order {
            sorted.push_row_from(self, i);
        }
        *self = sorted;
    }

    /// Contiguous per-lid runs; requires `sort_by_lid` first.
    pub fn lid_ranges(&self) -> Vec<(Lid, Range<usize>)> {
        let mut ranges = Vec::new();
        let mut start = 0;
        while start < self.len() {
            let lid = self.lid[start];
            let mut end = start + 1;
            while end < self.len() && self.lid[end] == lid {
                end += 1;
            }
            ranges.push((lid, start..end));
            start = end;
        }
        ranges
    }

    pub fn columns(&self, range: Range<usize>) -> VisitColumns<'_> {
        VisitColumns {
            state: &self.state[range.clone()],
            group: &self.group[range.clone()],
            behavior: &self.behavior[range.clone()],
            start_time: &self.start_time[range.clone()],
            end_time: &self.end_time[range.clone()],
            attrs: self.attrs.iter().map(|a| &a[range.clone()]).collect(),
        }
    }

    /// One share per destination rank, keyed by lid; empty shares included.
    pub fn scatter(&self, lid_rank: &FxHashMap<Lid, Rank>, n_ranks: usize) -> Result<Vec<VisitFrame>> {
        let mut shares = vec![VisitFrame::new(self.n_attrs()); n_ranks];
        for i in 0..self.len() {
            let rank = *lid_rank.get(&self.lid[i]).ok_or_else(|| {
                Error::InvalidInput(format!("lid {} is not in the location partition table", self.lid[i]))
            })?;
            shares[rank].push_row_from(self, i);
        }
        Ok(shares)
    }
}

impl Frame for VisitFrame {
    fn len(&self) -> usize {
        self.lid.len()
    }

    fn to_batch(&self, schema: &Schema) -> Result<RecordBatch> {
        let mut columns = vec![
            Column::Int64(self.lid.clone()),
            Column::Int64(self.pid.clone()),
            Column::Int8(self.group.clone()),
            Column::Int8(self.state.clone()),
            Column::Int8(self.behavior.clone()),
            Column::Int32(self.start_time.clone()),
            Column::Int32(self.end_time.clone()),
        ];
        for attr in &self.attrs {
            columns.push(Column::Int8(attr.clone()));
        }
        RecordBatch::new(schema.clone(), columns)
    }

    fn from_batch(batch: RecordBatch) -> Result<VisitFrame> {
        let n_attrs = batch.schema.n_fields().saturating_sub(7);
        let mut iter = batch.columns.into_iter();
        let mut next = |name: &str| {
            iter.next()
                .ok_or_else(|| Error::Transport(format!("visit batch is missing column {}", name)))
        };
        let frame = VisitFrame {
            lid: next("lid")?.into_i64()?,
            pid: next("pid")?.into_i64()?,
            group: next("group")?.into_i8()?,
            state: next("state")?.into_i8()?,
            behavior: next("behavior")?.into_i8()?,
            start_time: next("start_time")?.into_i32()?,
            end_time: next("end_time")?.into_i32()?,
            attrs: (0..n_attrs)
                .map(|_| next("attr")?.into_i8())
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(frame)
    }
}
