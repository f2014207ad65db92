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

pub mod actors;
pub mod behavior;
pub mod config;
pub mod disease;
pub mod epicurve;
pub mod error;
pub mod frame;
pub mod models;
pub mod partition;
pub mod simulation;
pub mod transport;

pub use crate::config::SimConfig;
pub use crate::disease::model::DiseaseModel;
pub use crate::error::{Error, Result};
pub use crate::simulation::Simulation;
