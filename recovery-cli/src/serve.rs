use std::{path::Path, time::Duration};

use anyhow::{Result, bail};
use log::info;
use recovery_core::protocol::{Command, OutputMessage};

use crate::{ground_link::GroundLink, trajectory::TrajectoryTable};

/// The board requests one altitude per tick, a longer silence means it reset
/// or left simulation mode.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PARACHUTE_ACTIVE: u8 = 3;
const RECOVERED: u8 = 4;

fn phase_name(code: u8) -> &'static str {
    match code {
        0 => "ready to launch",
        1 => "flying",
        2 => "drogue active",
        3 => "parachute active",
        4 => "recovered",
        _ => "unknown",
    }
}

/// Puts the board in simulation mode and answers its altitude requests from
/// `trajectory` until it reports the landing. Every answered request is
/// logged to `output` as time, altitude and phase.
pub fn serve(
    link: &mut GroundLink,
    trajectory: &TrajectoryTable,
    delay_s: f64,
    output: &Path,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_path(output)?;
    csv_writer.write_record(["time_s", "altitude_m", "phase"])?;

    link.send(&Command::SetSimulationMode(true))?;

    let mut phase: Option<u8> = None;
    loop {
        let Some(message) = link.receive(REQUEST_TIMEOUT)? else {
            bail!("no altitude request for {} s", REQUEST_TIMEOUT.as_secs());
        };
        match OutputMessage::decode(&message) {
            Some(OutputMessage::RequestSimulatedAltitude { time_ms }) => {
                let time_s = time_ms as f64 / 1000.0 - delay_s;
                let altitude = trajectory.altitude_at(time_s) as f32;
                link.send(&Command::SimulatedAltitude(altitude))?;
                csv_writer.write_record([
                    format!("{:.3}", time_s),
                    format!("{:.2}", altitude),
                    phase.map_or_else(String::new, |code| code.to_string()),
                ])?;
            }
            Some(OutputMessage::SimulatedFlightState(code)) if phase != Some(code) => {
                info!("board is {}", phase_name(code));
                let landed = phase == Some(PARACHUTE_ACTIVE) && code == RECOVERED;
                phase = Some(code);
                if landed {
                    break;
                }
            }
            Some(OutputMessage::SimulationMode(enabled)) => {
                info!("simulation mode {}", if enabled { "on" } else { "off" });
            }
            _ => {}
        }
    }

    csv_writer.flush()?;
    link.send(&Command::SetSimulationMode(false))?;
    info!("simulation log written to {}", output.display());
    Ok(())
}
