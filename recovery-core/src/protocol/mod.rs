//! Line protocol spoken over the serial link, frames look like `<code,arg1,...>`.

use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};

mod message;
mod parser;

pub use message::{Command, CommandError, OutputMessage};
pub use parser::{MAX_FIELDS, MessageParser, RawMessage, STREAM_BUFFER_LEN};

/// Codes of the frames sent to the board.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputCode {
    ReadStaticParameters = 0,
    ReadDynamicParameters = 1,
    WriteDynamicParameters = 2,
    RestoreFactoryParameters = 3,
    ClearFlightMemory = 4,
    ReadFlightReport = 5,
    SetSimulationMode = 6,
    SimulatedAltitude = 7,
    SetSpeedForLiftoffDetection = 8,
    SetSpeedForFallDetection = 9,
    SetSpeedForApogeeDetection = 10,
    SetParachuteDeploymentAltitude = 11,
    SetDisplacementForLandingDetection = 12,
    SetMaxDeploymentAttempts = 13,
    SetTimeStepScaler = 14,
}

/// Codes of the frames sent by the board.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(PrimitiveEnum_u8, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputCode {
    ErrorLog = 0,
    RequestSimulatedAltitude = 1,
    SimulatedFlightState = 2,
    FlightPath = 3,
    FirmwareVersion = 4,
    SimulationMode = 5,
    StartedInitialization = 6,
    FinishedInitialization = 7,
    StartedMemoryReport = 8,
    FinishedMemoryReport = 9,
    LiftoffEvent = 10,
    DrogueEvent = 11,
    ParachuteEvent = 12,
    LandedEvent = 13,
    ActuatorDischargeTime = 14,
    CapacitorRechargeTime = 15,
    WindowLength = 16,
    DeltaT = 17,
    SpeedForLiftoffDetection = 18,
    SpeedForFallDetection = 19,
    SpeedForApogeeDetection = 20,
    ParachuteDeploymentAltitude = 21,
    DisplacementForLandingDetection = 22,
    MaxDeploymentAttempts = 23,
    TimeStepScaler = 24,
    Apogee = 25,
}

/// First code of the parameter setters, parameters follow in field order.
pub(crate) const FIRST_PARAMETER_INPUT: u8 = InputCode::SetSpeedForLiftoffDetection as u8;
pub(crate) const FIRST_PARAMETER_OUTPUT: u8 = OutputCode::SpeedForLiftoffDetection as u8;
pub(crate) const FIRST_EVENT_OUTPUT: u8 = OutputCode::LiftoffEvent as u8;
