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

use crate::models::custom_types::Rank;

/// Sentinel for "no pending transition target".
pub const NULL_STATE: i8 = -1;
/// Sentinel for "not currently in transition".
pub const NULL_DWELL_TIME: i32 = -1;

/// The rank hosting the main actor.
pub const MASTER_RANK: Rank = 0;

/// Tolerance when checking that categorical probabilities sum to one.
pub const PROB_SUM_TOLERANCE: f64 = 1e-6;

/// State index the continuous-seeding behavior treats as susceptible.
pub const SUSCEPTIBLE_STATE: i8 = 0;
