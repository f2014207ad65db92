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

use crate::error::{Error, Result};
use crate::frame::batch::{Column, RecordBatch};
use crate::frame::schema::Schema;
use crate::frame::Frame;
use crate::models::custom_types::{Lid, Pid, Rank};

/// Contact-kernel outputs, one row per visit; `attrs` holds one `i32`
/// contact-count column per visual attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitOutputFrame {
    pub lid: Vec<Lid>,
    pub pid: Vec<Pid>,
    pub inf_prob: Vec<f64>,
    pub n_contacts: Vec<i32>,
    pub attrs: Vec<Vec<i32>>,
}

impl VisitOutputFrame {
    pub fn new(n_attrs: usize) -> VisitOutputFrame {
        VisitOutputFrame { attrs: vec![Vec::new(); n_attrs], ..VisitOutputFrame::default() }
    }

    pub fn n_attrs(&self) -> usize {
        self.attrs.len()
    }

    pub fn push(&mut self, lid: Lid, pid: Pid, inf_prob: f64, n_contacts: i32, attrs: &[i32]) {
        self.lid.push(lid);
        self.pid.push(pid);
        self.inf_prob.push(inf_prob);
        self.n_contacts.push(n_contacts);
        for (column, &value) in self.attrs.iter_mut().zip(attrs) {
            column.push(value);
        }
    }

    fn push_row_from(&mut self, other: &VisitOutputFrame, i: usize) {
        self.lid.push(other.lid[i]);
        self.pid.push(other.pid[i]);
        self.inf_prob.push(other.inf_prob[i]);
        self.n_contacts.push(other.n_contacts[i]);
        for (column, source) in self.attrs.iter_mut().zip(&other.attrs) {
            column.push(source[i]);
        }
    }

    pub fn validate(&self) -> Result<()> {
        for i in 0..self.len() {
            if !(0.0..=1.0).contains(&self.inf_prob[i]) || self.n_contacts[i] < 0 {
                return Err(Error::InvalidInput(format!(
                    "visit output for pid {} has inf_prob {} and n_contacts {}",
                    self.pid[i], self.inf_prob[i], self.n_contacts[i]
                )));
            }
            for attr in &self.attrs {
                if attr[i] < 0 {
                    return Err(Error::InvalidInput(format!(
                        "visit output for pid {} has a negative attribute count",
                        self.pid[i]
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn concat(n_attrs: usize, parts: impl IntoIterator<Item = VisitOutputFrame>) -> VisitOutputFrame {
        let mut out = VisitOutputFrame::new(n_attrs);
        for part in parts {
            out.lid.extend_from_slice(&part.lid);
            out.pid.extend_from_slice(&part.pid);
            out.inf_prob.extend_from_slice(&part.inf_prob);
            out.n_contacts.extend_from_slice(&part.n_contacts);
            for (column, source) in out.attrs.iter_mut().zip(&part.attrs) {
                column.extend_from_slice(source);
            }
        }
        out
    }

    pub fn sort_by_pid(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.pid[i]);

        let mut sorted = VisitOutputFrame::new(self.n_attrs());
        for &i in &order {
            sorted.push_row_from(self, i);
        }
        *self = sorted;
    }

    /// Contiguous per-pid runs; requires `sort_by_pid` first.
    pub fn pid_ranges(&self) -> FxHashMap<Pid, Range<usize>> {
        let mut ranges = FxHashMap::default();
        let mut start = 0;
        while start < self.len() {
            let pid = self.pid[start];
            let mut end = start + 1;
            while end < self.len() && self.pid[end] == pid {
                end += 1;
            }
            ranges.insert(pid, start..end);
            start = end;
        }
        ranges
    }

    pub fn scatter(
        &self,
        pid_rank: &FxHashMap<Pid, Rank>,
        n_ranks: usize,
    ) -> Result<Vec<VisitOutputFrame>> {
        let mut shares = vec![VisitOutputFrame::new(self.n_attrs()); n_ranks];
        for i in 0..self.len() {
            let rank = *pid_rank.get(&self.pid[i]).ok_or_else(|| {
                Error::InvalidInput(format!("pid {} is not in the person partition table", self.pid[i]))
            })?;
            shares[rank].push_row_from(self, i);
        }
        Ok(shares)
    }
}

impl Frame for VisitOutputFrame {
    fn len(&self) -> usize {
        self.lid.len()
    }

    fn to_batch(&self, schema: &Schema) -> Result<RecordBatch> {
        let mut columns = vec![
            Column::Int64(self.lid.clone()),
            Column::Int64(self.pid.clone()),
            Column::Float64(self.inf_prob.clone()),
            Column::Int32(self.n_contacts.clone()),
        ];
        for attr in &self.attrs {
            columns.push(Column::Int32(attr.clone()));
        }
        RecordBatch::new(schema.clone(), columns)
    }

    fn from_batch(batch: RecordBatch) -> Result<VisitOutputFrame> {
        let n_attrs = batch.schema.n_fields().saturating_sub(4);
        let mut iter = batch.columns.into_iter();
        let mut next = |name: &str| {
            iter.next()
                .ok_or_else(|| Error::Transport(format!("visit output batch is missing column {}", name)))
        };
        Ok(VisitOutputFrame {
            lid: next("lid")?.into_i64()?,
            pid: next("pid")?.into_i64()?,
            inf_prob: next("inf_prob")?.into_f64()?,
            n_contacts: next("n_contacts")?.into_i32()?,
            attrs: (0..n_attrs)
                .map(|_| next("attr")?.into_i32())
                .collect::<Result<Vec<_>>>()?,
        })
    }
}
