use std::{path::Path, time::Duration};

use anyhow::{Result, anyhow, bail};
use log::info;
use recovery_core::{
    ErrorFlags, ParameterId,
    protocol::{Command, OutputMessage},
};

use crate::ground_link::GroundLink;

const STATIC_PARAMETER_COUNT: usize = 5;

pub fn report(link: &mut GroundLink, timeout: Duration, csv: Option<&Path>) -> Result<()> {
    link.send(&Command::ReadFlightReport)?;

    let mut rows = Vec::new();
    loop {
        let message = link
            .receive(timeout)?
            .ok_or_else(|| anyhow!("flight report interrupted"))?;
        match OutputMessage::decode(&message) {
            Some(OutputMessage::StartedMemoryReport) => println!("flight report"),
            Some(OutputMessage::ErrorLog(error)) => {
                println!("  error {}: {}", error, ErrorFlags::describe(error));
            }
            Some(OutputMessage::Event { event, time_s }) => {
                println!("  {:<10} {:>7.1} s", event.name(), time_s);
            }
            Some(OutputMessage::FlightPath { time_s, altitude }) => rows.push((time_s, altitude)),
            Some(OutputMessage::Apogee(apogee)) => println!("  apogee     {:>7.1} m", apogee),
            Some(OutputMessage::FinishedMemoryReport) => break,
            _ => {}
        }
    }
    println!("  {} flight path samples", rows.len());

    match csv {
        Some(path) => {
            let mut csv_writer = csv::Writer::from_path(path)?;
            csv_writer.write_record(["time_s", "altitude_m"])?;
            for (time_s, altitude) in &rows {
                csv_writer.write_record([time_s.to_string(), altitude.to_string()])?;
            }
            csv_writer.flush()?;
            info!("flight path written to {}", path.display());
        }
        None => {
            for (time_s, altitude) in &rows {
                println!("{:>8.1} {:>8.1}", time_s, altitude);
            }
        }
    }
    Ok(())
}

pub fn params(link: &mut GroundLink, timeout: Duration) -> Result<()> {
    link.send(&Command::ReadStaticParameters)?;
    link.send(&Command::ReadDynamicParameters)?;

    let expected = STATIC_PARAMETER_COUNT + ParameterId::ALL.len();
    let mut received = 0;
    while received < expected {
        let Some(message) = link.receive(timeout)? else {
            bail!("only {} of {} parameters received", received, expected);
        };
        let line = match OutputMessage::decode(&message) {
            Some(OutputMessage::FirmwareVersion(version)) => format!("firmware version {}", version),
            Some(OutputMessage::ActuatorDischargeTime(ms)) => format!("discharge time {} ms", ms),
            Some(OutputMessage::CapacitorRechargeTime(ms)) => format!("recharge time {} ms", ms),
            Some(OutputMessage::WindowLength(n)) => format!("window length {}", n),
            Some(OutputMessage::DeltaT(ms)) => format!("time step {} ms", ms),
            Some(OutputMessage::Parameter { id, value }) => format!("{} = {}", id.name(), value),
            _ => continue,
        };
        println!("{}", line);
        received += 1;
    }
    Ok(())
}

pub fn set_param(
    link: &mut GroundLink,
    timeout: Duration,
    name: &str,
    value: i16,
    persist: bool,
) -> Result<()> {
    let Some(id) = ParameterId::from_name(name) else {
        let names = ParameterId::ALL.map(|id| id.name()).join(", ");
        bail!("unknown parameter {}, expected one of {}", name, names);
    };

    link.send(&Command::SetParameter { id, value })?;
    wait_for_parameter(link, timeout, id)
        .ok_or_else(|| anyhow!("{} = {} rejected by the board", name, value))??;
    println!("{} = {}", id.name(), value);

    if persist {
        link.send(&Command::WriteDynamicParameters)?;
        wait_for_parameter(link, timeout, id)
            .ok_or_else(|| anyhow!("no confirmation that the parameters were written"))??;
        info!("parameters written to the board's memory");
    }
    Ok(())
}

pub fn restore_params(link: &mut GroundLink, timeout: Duration) -> Result<()> {
    link.send(&Command::RestoreFactoryParameters)?;
    for _ in ParameterId::ALL {
        let Some(message) = link.receive(timeout)? else {
            bail!("board did not confirm the factory parameters");
        };
        if let Some(OutputMessage::Parameter { id, value }) = OutputMessage::decode(&message) {
            println!("{} = {}", id.name(), value);
        }
    }
    Ok(())
}

pub fn clear(link: &mut GroundLink) -> Result<()> {
    link.send(&Command::ClearFlightMemory)?;
    info!("clear requested, ignored by the board while in flight");
    Ok(())
}

/// Waits for the echo of parameter `id`. `None` on timeout.
fn wait_for_parameter(
    link: &mut GroundLink,
    timeout: Duration,
    id: ParameterId,
) -> Option<Result<()>> {
    loop {
        let message = match link.receive(timeout) {
            Ok(Some(message)) => message,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };
        if let Some(OutputMessage::Parameter { id: echoed, .. }) = OutputMessage::decode(&message) {
            if echoed == id {
                return Some(Ok(()));
            }
        }
    }
}
