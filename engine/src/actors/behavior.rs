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
use crate::behavior::BehaviorModel;
use crate::error::Result;
use crate::frame::{Frame, StateFrame, VisitOutputFrame};
use crate::models::constants::MASTER_RANK;
use crate::models::custom_types::Rank;
use crate::transport::{ActorId, Envelope, Message, Network};

/// Hosts this rank's slice of the behavior model: on `start_tick` it
/// scatters the cached frames into the pipeline, and once the progressed
/// state and visit outputs are back it steps the model and reports the
/// epicurve row.
pub struct BehaviorActor {
    rank: Rank,
    ctx: Arc<ConfigContext>,
    net: Network,
    model: Box<dyn BehaviorModel>,
    new_state_batches: Vec<Option<Vec<u8>>>,
    visit_output_batches: Vec<Option<Vec<u8>>>,
}

impl BehaviorActor {
    pub fn new(
        rank: Rank,
        ctx: Arc<ConfigContext>,
        net: Network,
        model: Box<dyn BehaviorModel>,
    ) -> BehaviorActor {
        BehaviorActor {
            rank,
            ctx,
            net,
            model,
            new_state_batches: Vec::new(),
            visit_output_batches: Vec::new(),
        }
    }

    pub fn on_start_tick(&mut self) -> Result<()> {
        debug!("rank {}: scattering next tick's frames", self.rank);
        let visit_shares = self.model.next_visits().scatter(&self.ctx.lid_rank, self.ctx.n_ranks)?;
        for (rank, share) in visit_shares.iter().enumerate() {
            let payload = encode_share(share, &self.ctx.visit_schema)?;
            self.net.send(
                rank,
                Envelope { to: ActorId::Location, from: self.rank, msg: Message::Visit(payload) },
            )?;
        }

        let state_shares =
            self.model.next_state().scatter(&self.ctx.pid_prog_rank, self.ctx.n_ranks)?;
        for (rank, share) in state_shares.iter().enumerate() {
            let payload = encode_share(share, &self.ctx.state_schema)?;
            self.net.send(
                rank,
                Envelope { to: ActorId::Progression, from: self.rank, msg: Message::CurrentState(payload) },
            )?;
        }
        Ok(())
    }

    pub fn on_new_state(&mut self, batch: Option<Vec<u8>>) -> Result<()> {
        self.new_state_batches.push(batch);
        self.maybe_step()
    }

    pub fn on_visit_output(&mut self, batch: Option<Vec<u8>>) -> Result<()> {
        self.visit_output_batches.push(batch);
        self.maybe_step()
    }

    fn maybe_step(&mut self) -> Result<()> {
        if self.new_state_batches.len() < self.ctx.n_ranks
            || self.visit_output_batches.len() < self.ctx.n_ranks
        {
            return Ok(());
        }
        self.step()
    }

    fn step(&mut self) -> Result<()> {
        let state_frames =
            decode_shares::<StateFrame>(std::mem::take(&mut self.new_state_batches), &self.ctx.state_schema)?;
        let new_state = StateFrame::concat(state_frames);
        let output_frames = decode_shares::<VisitOutputFrame>(
            std::mem::take(&mut self.visit_output_batches),
            &self.ctx.visit_output_schema,
        )?;
        let visit_output = VisitOutputFrame::concat(self.ctx.n_attrs(), output_frames);

        let row = new_state.histogram(self.ctx.disease_model.n_states())?;
        debug!("rank {}: behavior step over {} persons", self.rank, new_state.len());
        self.model.run(new_state, visit_output)?;

        self.net.send(
            MASTER_RANK,
            Envelope { to: ActorId::Main, from: self.rank, msg: Message::EndTick(row) },
        )?;
        Ok(())
    }
}
