mod args;
mod commands;
mod config;
mod file_storage;
mod ground_link;
mod serve;
mod simulate;
mod trajectory;

use std::{io, time::Duration};

use anyhow::Result;
use args::{Cli, ModeSelect};
use clap::Parser;
use config::CliConfig;
use file_storage::FileStorage;
use ground_link::GroundLink;
use log::{LevelFilter, info};
use simulate::{SimulationOptions, run_simulation};
use trajectory::{Trajectory, TrajectoryTable};

fn main() -> Result<()> {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .try_init();
    let args = Cli::parse();
    let config = CliConfig::load()?;
    let timeout = Duration::from_millis(config.timeout_ms);

    match args.mode {
        ModeSelect::Simulate(sim) => {
            let trajectory = match &sim.trajectory {
                Some(path) => Trajectory::Table(TrajectoryTable::load(path)?),
                None => {
                    let flight = config.synthetic_flight.clone();
                    info!("synthetic flight, apogee {:.1} m", flight.apogee());
                    Trajectory::Synthetic(flight)
                }
            };
            let storage = FileStorage::open(&sim.eeprom, sim.fresh)?;
            let options = SimulationOptions {
                noise_amplitude: config.synthetic_flight.noise_amplitude,
                seed: sim.seed.unwrap_or_else(rand::random),
                max_time_s: sim.max_time_s,
                csv: sim.csv.as_deref(),
            };
            let outcome = run_simulation(trajectory, storage, &options, io::stdout())?;
            for (code, time_s) in &outcome.phases {
                info!("phase {} entered at {:.1} s", code, time_s);
            }
            for (channel, time_s) in &outcome.firings {
                info!("{} fired at {:.1} s", channel.name(), time_s);
            }
            if let Some(apogee) = outcome.apogee {
                info!("apogee {:.1} m", apogee);
            }
        }
        ModeSelect::Serve(cli) => {
            let trajectory = TrajectoryTable::load(&cli.trajectory)?;
            let output = cli.trajectory.with_extension("simulation.csv");
            let mut link = GroundLink::open(&config, args.port.as_deref())?;
            serve::serve(&mut link, &trajectory, cli.delay_s, &output)?;
        }
        ModeSelect::Report(report) => {
            let mut link = GroundLink::open(&config, args.port.as_deref())?;
            commands::report(&mut link, timeout, report.csv.as_deref())?;
        }
        ModeSelect::Params => {
            let mut link = GroundLink::open(&config, args.port.as_deref())?;
            commands::params(&mut link, timeout)?;
        }
        ModeSelect::SetParam(set) => {
            let mut link = GroundLink::open(&config, args.port.as_deref())?;
            commands::set_param(&mut link, timeout, &set.name, set.value, set.persist)?;
        }
        ModeSelect::RestoreParams => {
            let mut link = GroundLink::open(&config, args.port.as_deref())?;
            commands::restore_params(&mut link, timeout)?;
        }
        ModeSelect::Clear => {
            let mut link = GroundLink::open(&config, args.port.as_deref())?;
            commands::clear(&mut link)?;
        }
    }

    Ok(())
}
