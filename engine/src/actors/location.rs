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

use std::sync::Arc;

use log::debug;

use crate::actors::{decode_shares, encode_share, ConfigContext};
use crate::error::Result;
use crate::frame::{Frame, VisitFrame, VisitOutputFrame};
use crate::models::custom_types::Rank;
use crate::transport::{ActorId, Envelope, Message, Network};

/// Runs the contact kernel once every behavior rank has shipped its visit
/// share, then scatters the outputs to the progression actors.
pub struct LocationActor {
    rank: Rank,
    ctx: Arc<ConfigContext>,
    net: Network,
    visit_batches: Vec<Option<Vec<u8>>>,
}

impl LocationActor {
    pub fn new(rank: Rank, ctx: Arc<ConfigContext>, net: Network) -> LocationActor {
        LocationActor { rank, ctx, net, visit_batches: Vec::new() }
    }

    pub fn on_visit(&mut self, batch: Option<Vec<u8>>) -> Result<()> {
        self.visit_batches.push(batch);
        if self.visit_batches.len() < self.ctx.behav_count() {
            return Ok(());
        }
        self.compute_visit_output()
    }

    fn compute_visit_output(&mut self) -> Result<()> {
        let batches = std::mem::take(&mut self.visit_batches);
        let frames = decode_shares::<VisitFrame>(batches, &self.ctx.visit_schema)?;
        let mut visits = VisitFrame::concat(self.ctx.n_attrs(), frames);
        visits.validate()?;
        visits.sort_by_lid();
        debug!("rank {}: contact kernel over {} visits", self.rank, visits.len());

        let mut output = VisitOutputFrame::new(self.ctx.n_attrs());
        let mut attr_row = vec![0i32; self.ctx.n_attrs()];
        for (lid, range) in visits.lid_ranges() {
            let result = self.ctx.disease_model.compute_visit_output(&visits.columns(range.clone()));
            for (k, i) in range.enumerate() {
                for (cell, column) in attr_row.iter_mut().zip(&result.attrs) {
                    *cell = column[k];
                }
                output.push(lid, visits.pid[i], result.inf_prob[k], result.n_contacts[k], &attr_row);
            }
        }

        let shares = output.scatter(&self.ctx.pid_prog_rank, self.ctx.n_ranks)?;
        for (rank, share) in shares.iter().enumerate() {
            let payload = encode_share(share, &self.ctx.visit_output_schema)?;
            self.net.send(
                rank,
                Envelope { to: ActorId::Progression, from: self.rank, msg: Message::VisitOutput(payload) },
            )?;
        }
        Ok(())
    }
}
