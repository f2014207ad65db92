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

//! Explicit run configuration, built once per process from the environment
//! and passed by reference from then on.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub seed: i64,
    pub tick_time: i32,
    pub num_ticks: i32,
    pub visual_attributes: Vec<String>,
    pub disease_model_file: PathBuf,
    pub start_state_file: PathBuf,
    pub visit_files: Vec<PathBuf>,
    pub lid_partition: PathBuf,
    pub pid_partition: PathBuf,
    pub output_file: PathBuf,
    pub per_node_behavior: bool,
    pub start_exposed_seed: Option<usize>,
    pub tick_exposed_seed: Option<usize>,
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("missing required environment value {}", name)))
}

fn parse<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = required(name)?;
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("cannot parse {}={}: {}", name, raw, e)))
}

fn parse_optional<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("cannot parse {}={}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

fn parse_bool_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(false),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => Err(Error::Config(format!("cannot parse {}={} as a boolean", name, other))),
        },
    }
}

impl SimConfig {
    pub fn from_env() -> Result<SimConfig> {
        let seed = parse::<i64>("SEED")?;
        let tick_time = parse::<i32>("TICK_TIME")?;
        if tick_time <= 0 {
            return Err(Error::Config(format!("TICK_TIME must be positive, got {}", tick_time)));
        }
        let num_ticks = parse::<i32>("NUM_TICKS")?;
        if num_ticks <= 0 {
            return Err(Error::Config(format!("NUM_TICKS must be positive, got {}", num_ticks)));
        }

        let visual_attributes: Vec<String> = required("VISUAL_ATTRIBUTES")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let mut visit_files = Vec::new();
        for i in 0.. {
            match env::var(format!("VISIT_FILE_{}", i)) {
                Ok(path) => visit_files.push(PathBuf::from(path)),
                Err(_) => break,
            }
        }
        if visit_files.is_empty() {
            return Err(Error::Config("no VISIT_FILE_0 given".to_string()));
        }

        Ok(SimConfig {
            seed,
            tick_time,
            num_ticks,
            visual_attributes,
            disease_model_file: PathBuf::from(required("DISEASE_MODEL_FILE")?),
            start_state_file: PathBuf::from(required("START_STATE_FILE")?),
            visit_files,
            lid_partition: PathBuf::from(required("LID_PARTITION")?),
            pid_partition: PathBuf::from(required("PID_PARTITION")?),
            output_file: PathBuf::from(required("OUTPUT_FILE")?),
            per_node_behavior: parse_bool_flag("PER_NODE_BEHAVIOR")?,
            start_exposed_seed: parse_optional::<usize>("START_EXPOSED_SEED")?,
            tick_exposed_seed: parse_optional::<usize>("TICK_EXPOSED_SEED")?,
        })
    }
}
