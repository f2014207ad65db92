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

//! One worker per rank: a single-threaded cooperative dispatch loop over
//! the rank's mailbox. Handlers run to completion; a handler error is
//! fail-stop for the whole job.

use std::sync::Arc;

use fxhash::FxHashSet;
use log::{debug, error};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::actors::{BehaviorActor, ConfigContext, LocationActor, MainActor, ProgressionActor};
use crate::behavior::build_behavior_model;
use crate::config::SimConfig;
use crate::error::{Error, Result};
use crate::models::constants::MASTER_RANK;
use crate::models::custom_types::{Pid, Rank};
use crate::transport::{ActorId, Envelope, Message, Network};

pub struct Worker {
    rank: Rank,
    net: Network,
    inbox: UnboundedReceiver<Envelope>,
    location: LocationActor,
    progression: ProgressionActor,
    behavior: Option<BehaviorActor>,
    main: Option<MainActor>,
}

impl Worker {
    pub fn new(
        rank: Rank,
        ctx: Arc<ConfigContext>,
        net: Network,
        inbox: UnboundedReceiver<Envelope>,
        config: &SimConfig,
    ) -> Result<Worker> {
        let behavior = if ctx.behav_ranks.contains(&rank) {
            let pids: FxHashSet<Pid> = ctx
                .pid_behav_rank
                .iter()
                .filter(|&(_, &r)| r == rank)
                .map(|(&pid, _)| pid)
                .collect();
            let model = build_behavior_model(
                config,
                ctx.disease_model.exposed_state(),
                Some(pids),
                config.seed + rank as i64,
            )?;
            Some(BehaviorActor::new(rank, ctx.clone(), net.clone(), model))
        } else {
            None
        };

        let main = if rank == MASTER_RANK {
            Some(MainActor::new(
                rank,
                ctx.clone(),
                net.clone(),
                config.num_ticks,
                config.output_file.clone(),
            ))
        } else {
            None
        };

        Ok(Worker {
            rank,
            location: LocationActor::new(rank, ctx.clone(), net.clone()),
            progression: ProgressionActor::new(rank, ctx, net.clone()),
            behavior,
            main,
            net,
            inbox,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(envelope) = self.inbox.recv().await {
            if matches!(envelope.msg, Message::Shutdown) {
                debug!("rank {}: shutting down", self.rank);
                break;
            }
            if let Err(e) = self.dispatch(envelope) {
                error!("rank {}: fatal: {}", self.rank, e);
                // Fail-stop: bring the rest of the job down rather than
                // leaving it waiting at a barrier.
                let _ = self.net.broadcast(self.rank, ActorId::Main, Message::Shutdown);
                return Err(e);
            }
        }
        Ok(())
    }

    fn behavior_actor(&mut self) -> Result<&mut BehaviorActor> {
        self.behavior
            .as_mut()
            .ok_or_else(|| Error::Transport(format!("rank {} hosts no behavior actor", self.rank)))
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<()> {
        let Envelope { to, from, msg } = envelope;
        match (to, msg) {
            (ActorId::Location, Message::Visit(batch)) => self.location.on_visit(batch),
            (ActorId::Progression, Message::CurrentState(batch)) => {
                self.progression.on_current_state(batch)
            }
            (ActorId::Progression, Message::VisitOutput(batch)) => {
                self.progression.on_visit_output(batch)
            }
            (ActorId::Behavior, Message::StartTick) => self.behavior_actor()?.on_start_tick(),
            (ActorId::Behavior, Message::NewState(batch)) => self.behavior_actor()?.on_new_state(batch),
            (ActorId::Behavior, Message::VisitOutput(batch)) => {
                self.behavior_actor()?.on_visit_output(batch)
            }
            (ActorId::Main, Message::EndTick(part)) => {
                let main = self.main.as_mut().ok_or_else(|| {
                    Error::Transport(format!("rank {} hosts no main actor", self.rank))
                })?;
                main.on_end_tick(part)
            }
            (to, msg) => Err(Error::Transport(format!(
                "rank {}: unexpected {} message for {:?} from rank {}",
                self.rank,
                msg.kind(),
                to,
                from
            ))),
        }
    }
}
