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

use std::path::PathBuf;
use std::sync::Arc;

use log::info;

use crate::actors::ConfigContext;
use crate::epicurve::Epicurve;
use crate::error::{Error, Result};
use crate::models::custom_types::{Count, Rank, Tick};
use crate::transport::{ActorId, Envelope, Message, Network};

/// Drives the ticks: accumulates one epicurve part per behavior rank,
/// rebroadcasts `start_tick` while ticks remain, then writes the epicurve
/// and shuts the job down.
pub struct MainActor {
    rank: Rank,
    ctx: Arc<ConfigContext>,
    net: Network,
    num_ticks: Tick,
    cur_tick: Tick,
    output_file: PathBuf,
    epicurve: Epicurve,
    parts: Vec<Vec<Count>>,
}

impl MainActor {
    pub fn new(
        rank: Rank,
        ctx: Arc<ConfigContext>,
        net: Network,
        num_ticks: Tick,
        output_file: PathBuf,
    ) -> MainActor {
        let epicurve = Epicurve::new(ctx.disease_model.state_names().to_vec());
        MainActor { rank, ctx, net, num_ticks, cur_tick: 0, output_file, epicurve, parts: Vec::new() }
    }

    fn start_tick(&self) -> Result<()> {
        info!("Starting tick {}", self.cur_tick);
        for &rank in &self.ctx.behav_ranks {
            self.net.send(
                rank,
                Envelope { to: ActorId::Behavior, from: self.rank, msg: Message::StartTick },
            )?;
        }
        Ok(())
    }

    pub fn on_end_tick(&mut self, part: Vec<Count>) -> Result<()> {
        self.parts.push(part);
        if self.parts.len() < self.ctx.behav_count() {
            return Ok(());
        }

        let parts = std::mem::take(&mut self.parts);
        let n_states = self.ctx.disease_model.n_states();
        let mut row = vec![0u64; n_states];
        for part in parts {
            if part.len() != n_states {
                return Err(Error::Transport(format!(
                    "epicurve part has {} cells, expected {}",
                    part.len(),
                    n_states
                )));
            }
            for (total, value) in row.iter_mut().zip(part) {
                *total += value;
            }
        }
        self.epicurve.push_row(row)?;
        self.cur_tick += 1;

        if self.cur_tick < self.num_ticks {
            self.start_tick()
        } else {
            info!("writing epicurve to {}", self.output_file.display());
            self.epicurve.write(&self.output_file)?;
            self.net.broadcast(self.rank, ActorId::Main, Message::Shutdown)
        }
    }
}
