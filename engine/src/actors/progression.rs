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
use crate::error::{Error, Result};
use crate::frame::{Frame, StateFrame, VisitOutputFrame};
use crate::models::custom_types::Rank;
use crate::transport::{ActorId, Envelope, Message, Network};

/// Joins the local state shard with the visit outputs touching it, advances
/// every local person by one tick, and scatters the results to the behavior
/// actors.
pub struct ProgressionActor {
    rank: Rank,
    ctx: Arc<ConfigContext>,
    net: Network,
    state_batches: Vec<Option<Vec<u8>>>,
    visit_output_batches: Vec<Option<Vec<u8>>>,
}

impl ProgressionActor {
    pub fn new(rank: Rank, ctx: Arc<ConfigContext>, net: Network) -> ProgressionActor {
        ProgressionActor {
            rank,
            ctx,
            net,
            state_batches: Vec::new(),
            visit_output_batches: Vec::new(),
        }
    }

    pub fn on_current_state(&mut self, batch: Option<Vec<u8>>) -> Result<()> {
        self.state_batches.push(batch);
        self.maybe_compute()
    }

    pub fn on_visit_output(&mut self, batch: Option<Vec<u8>>) -> Result<()> {
        self.visit_output_batches.push(batch);
        self.maybe_compute()
    }

    fn maybe_compute(&mut self) -> Result<()> {
        // One state share per behavior rank, one output share per rank.
        if self.state_batches.len() < self.ctx.behav_count()
            || self.visit_output_batches.len() < self.ctx.n_ranks
        {
            return Ok(());
        }
        self.compute_progression_output()
    }

    fn compute_progression_output(&mut self) -> Result<()> {
        let state_frames =
            decode_shares::<StateFrame>(std::mem::take(&mut self.state_batches), &self.ctx.state_schema)?;
        let state = StateFrame::concat(state_frames);
        let output_frames = decode_shares::<VisitOutputFrame>(
            std::mem::take(&mut self.visit_output_batches),
            &self.ctx.visit_output_schema,
        )?;
        let mut visit_output = VisitOutputFrame::concat(self.ctx.n_attrs(), output_frames);
        visit_output.validate()?;
        visit_output.sort_by_pid();
        debug!(
            "rank {}: progression over {} persons, {} visit outputs",
            self.rank,
            state.len(),
            visit_output.len()
        );

        let pid_index = state.pid_index()?;
        let ranges = visit_output.pid_ranges();
        for pid in ranges.keys() {
            if !pid_index.contains_key(pid) {
                return Err(Error::InvalidInput(format!(
                    "visit output for pid {} reached rank {} without a state row",
                    pid, self.rank
                )));
            }
        }

        // Every local person advances, with or without visit outputs.
        let mut new_state = StateFrame::new();
        for i in 0..state.len() {
            let row = state.row(i);
            let probs: &[f64] = match ranges.get(&row.pid) {
                Some(range) => &visit_output.inf_prob[range.clone()],
                None => &[],
            };
            new_state.push(self.ctx.disease_model.compute_progression_output(
                &row,
                probs,
                self.ctx.tick_time,
            ));
        }

        let state_shares = new_state.scatter(&self.ctx.pid_behav_rank, self.ctx.n_ranks)?;
        let output_shares = visit_output.scatter(&self.ctx.pid_behav_rank, self.ctx.n_ranks)?;
        for &dest in &self.ctx.behav_ranks {
            let payload = encode_share(&state_shares[dest], &self.ctx.state_schema)?;
            self.net.send(
                dest,
                Envelope { to: ActorId::Behavior, from: self.rank, msg: Message::NewState(payload) },
            )?;
            let payload = encode_share(&output_shares[dest], &self.ctx.visit_output_schema)?;
            self.net.send(
                dest,
                Envelope { to: ActorId::Behavior, from: self.rank, msg: Message::VisitOutput(payload) },
            )?;
        }
        Ok(())
    }
}
