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
use std::time::Instant;

use log::info;

use crate::actors::{ConfigContext, Worker};
use crate::behavior::build_behavior_model;
use crate::config::SimConfig;
use crate::disease::model::DiseaseModel;
use crate::epicurve::Epicurve;
use crate::error::{Error, Result};
use crate::frame::{Frame, StateFrame, VisitOutputFrame};
use crate::models::constants::MASTER_RANK;
use crate::transport::{ActorId, Envelope, Message, Network};

pub struct Simulation {
    config: SimConfig,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Simulation {
        Simulation { config }
    }

    /// Single-process reference run: the same kernels and behavior model as
    /// the distributed pipeline, without the sharding.
    pub fn run_simple(&self) -> Result<()> {
        let config = &self.config;
        let start = Instant::now();

        info!("loading disease model");
        let disease_model = DiseaseModel::load(&config.disease_model_file)?;
        info!("initializing behavior model");
        let mut behavior =
            build_behavior_model(config, disease_model.exposed_state(), None, config.seed)?;

        let n_attrs = config.visual_attributes.len();
        let mut epicurve = Epicurve::new(disease_model.state_names().to_vec());

        for tick in 0..config.num_ticks {
            info!("Starting tick {}", tick);
            let state = behavior.next_state().clone();
            let mut visits = behavior.next_visits().clone();
            visits.validate()?;
            visits.sort_by_lid();

            let mut visit_output = VisitOutputFrame::new(n_attrs);
            let mut attr_row = vec![0i32; n_attrs];
            for (lid, range) in visits.lid_ranges() {
                let result = disease_model.compute_visit_output(&visits.columns(range.clone()));
                for (k, i) in range.enumerate() {
                    for (cell, column) in attr_row.iter_mut().zip(&result.attrs) {
                        *cell = column[k];
                    }
                    visit_output.push(
                        lid,
                        visits.pid[i],
                        result.inf_prob[k],
                        result.n_contacts[k],
                        &attr_row,
                    );
                }
            }
            visit_output.sort_by_pid();

            let pid_index = state.pid_index()?;
            let ranges = visit_output.pid_ranges();
            for pid in ranges.keys() {
                if !pid_index.contains_key(pid) {
                    return Err(Error::InvalidInput(format!(
                        "visit output references pid {} with no state row",
                        pid
                    )));
                }
            }

            let mut new_state = StateFrame::new();
            for i in 0..state.len() {
                let row = state.row(i);
                let probs: &[f64] = match ranges.get(&row.pid) {
                    Some(range) => &visit_output.inf_prob[range.clone()],
                    None => &[],
                };
                new_state.push(disease_model.compute_progression_output(&row, probs, config.tick_time));
            }

            epicurve.push_row(new_state.histogram(disease_model.n_states())?)?;
            behavior.run(new_state, visit_output)?;
        }

        info!("saving epicurve to {}", config.output_file.display());
        epicurve.write(&config.output_file)?;
        info!("simulation completed in {:.2} seconds", start.elapsed().as_secs_f32());
        Ok(())
    }

    /// Multi-rank run over the in-process transport: one worker task per
    /// rank, driven by the main actor on the master rank.
    pub async fn run_distributed(&self) -> Result<()> {
        let config = &self.config;
        let start = Instant::now();

        let ctx = Arc::new(ConfigContext::load(config)?);
        info!(
            "starting {} ranks ({} nodes x {} cpus), {} behavior ranks",
            ctx.n_ranks,
            ctx.n_nodes,
            ctx.cpus_per_node,
            ctx.behav_count()
        );

        let (net, inboxes) = Network::new(ctx.n_ranks);
        let mut handles = Vec::with_capacity(ctx.n_ranks);
        for (rank, inbox) in inboxes.into_iter().enumerate() {
            let worker = Worker::new(rank, ctx.clone(), net.clone(), inbox, config)?;
            handles.push(tokio::spawn(worker.run()));
        }

        info!("Starting tick 0");
        for &rank in &ctx.behav_ranks {
            net.send(
                rank,
                Envelope { to: ActorId::Behavior, from: MASTER_RANK, msg: Message::StartTick },
            )?;
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| Error::Transport(format!("worker task failed: {}", e)))??;
        }
        info!("simulation completed in {:.2} seconds", start.elapsed().as_secs_f32());
        Ok(())
    }
}
