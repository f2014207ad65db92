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
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use pansim::config::SimConfig;
use pansim::partition::{partition_visit_files, write_lid_partition, write_pid_partition};
use pansim::Simulation;

#[derive(Parser)]
#[command(author, version, about = "PanSim: the pandemic simulator")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Partition the locations and persons onto cpus.
    Partition {
        #[arg(short = 'l', long, value_name = "FILE", help = "The location partition output file")]
        location_partition: PathBuf,

        #[arg(short = 'p', long, value_name = "FILE", help = "The person partition output file")]
        person_partition: PathBuf,

        #[arg(short = 'n', long, default_value_t = 1, help = "Number of nodes")]
        num_nodes: usize,

        #[arg(short = 'c', long, default_value_t = 2, help = "Number of cpus per node")]
        num_cpu_per_node: usize,

        #[arg(value_name = "VISIT_FILE", required = true)]
        visit_files: Vec<PathBuf>,
    },

    /// Run the single-process reference simulation.
    Simplesim,

    /// Run the multi-rank simulation.
    Distsim,
}

async fn run(args: Args) -> pansim::Result<()> {
    match args.command {
        Command::Partition {
            location_partition,
            person_partition,
            num_nodes,
            num_cpu_per_node,
            visit_files,
        } => {
            let (lid_records, pid_records) =
                partition_visit_files(&visit_files, num_nodes, num_cpu_per_node)?;
            write_lid_partition(&location_partition, &lid_records)?;
            write_pid_partition(&person_partition, &pid_records)?;
            Ok(())
        }
        Command::Simplesim => Simulation::new(SimConfig::from_env()?).run_simple(),
        Command::Distsim => Simulation::new(SimConfig::from_env()?).run_distributed().await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
