use core::fmt::Write;

use heapless::String;
use packed_struct::PrimitiveEnum;

use super::{
    FIRST_EVENT_OUTPUT, FIRST_PARAMETER_INPUT, FIRST_PARAMETER_OUTPUT, InputCode, OutputCode,
    RawMessage, STREAM_BUFFER_LEN,
};
use crate::{flight_log::FlightEvent, params::ParameterId};

/// Request received from the ground.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ReadStaticParameters,
    ReadDynamicParameters,
    WriteDynamicParameters,
    RestoreFactoryParameters,
    ClearFlightMemory,
    ReadFlightReport,
    SetSimulationMode(bool),
    SimulatedAltitude(f32),
    SetParameter { id: ParameterId, value: i16 },
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    MissingCode,
    UnknownCode(i64),
    MissingArgument(InputCode),
    InvalidArgument(InputCode),
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandError::MissingCode => write!(f, "frame without a numeric code"),
            CommandError::UnknownCode(code) => write!(f, "unknown command code {}", code),
            CommandError::MissingArgument(code) => write!(f, "{:?} needs an argument", code),
            CommandError::InvalidArgument(code) => write!(f, "invalid argument for {:?}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CommandError {}

impl Command {
    pub fn decode(message: &RawMessage) -> Result<Self, CommandError> {
        let code = message.int(0).ok_or(CommandError::MissingCode)?;
        let input_code = u8::try_from(code)
            .ok()
            .and_then(InputCode::from_primitive)
            .ok_or(CommandError::UnknownCode(code))?;

        let int_argument = || -> Result<i64, CommandError> {
            let field = message
                .field(1)
                .filter(|f| !f.is_empty())
                .ok_or(CommandError::MissingArgument(input_code))?;
            field
                .parse()
                .map_err(|_| CommandError::InvalidArgument(input_code))
        };

        let command = match input_code {
            InputCode::ReadStaticParameters => Command::ReadStaticParameters,
            InputCode::ReadDynamicParameters => Command::ReadDynamicParameters,
            InputCode::WriteDynamicParameters => Command::WriteDynamicParameters,
            InputCode::RestoreFactoryParameters => Command::RestoreFactoryParameters,
            InputCode::ClearFlightMemory => Command::ClearFlightMemory,
            InputCode::ReadFlightReport => Command::ReadFlightReport,
            InputCode::SetSimulationMode => match int_argument()? {
                0 => Command::SetSimulationMode(false),
                1 => Command::SetSimulationMode(true),
                _ => return Err(CommandError::InvalidArgument(input_code)),
            },
            InputCode::SimulatedAltitude => {
                let field = message
                    .field(1)
                    .filter(|f| !f.is_empty())
                    .ok_or(CommandError::MissingArgument(input_code))?;
                let altitude: f32 = field
                    .parse()
                    .ok()
                    .filter(|altitude: &f32| altitude.is_finite())
                    .ok_or(CommandError::InvalidArgument(input_code))?;
                Command::SimulatedAltitude(altitude)
            }
            InputCode::SetSpeedForLiftoffDetection
            | InputCode::SetSpeedForFallDetection
            | InputCode::SetSpeedForApogeeDetection
            | InputCode::SetParachuteDeploymentAltitude
            | InputCode::SetDisplacementForLandingDetection
            | InputCode::SetMaxDeploymentAttempts
            | InputCode::SetTimeStepScaler => {
                let id = ParameterId::from_index(input_code.to_primitive() - FIRST_PARAMETER_INPUT)
                    .ok_or(CommandError::UnknownCode(code))?;
                let value = i16::try_from(int_argument()?)
                    .map_err(|_| CommandError::InvalidArgument(input_code))?;
                Command::SetParameter { id, value }
            }
        };
        Ok(command)
    }

    pub fn code(&self) -> InputCode {
        match self {
            Command::ReadStaticParameters => InputCode::ReadStaticParameters,
            Command::ReadDynamicParameters => InputCode::ReadDynamicParameters,
            Command::WriteDynamicParameters => InputCode::WriteDynamicParameters,
            Command::RestoreFactoryParameters => InputCode::RestoreFactoryParameters,
            Command::ClearFlightMemory => InputCode::ClearFlightMemory,
            Command::ReadFlightReport => InputCode::ReadFlightReport,
            Command::SetSimulationMode(_) => InputCode::SetSimulationMode,
            Command::SimulatedAltitude(_) => InputCode::SimulatedAltitude,
            Command::SetParameter { id, .. } => {
                InputCode::from_primitive(FIRST_PARAMETER_INPUT + id.index())
                    .unwrap_or(InputCode::SetSpeedForLiftoffDetection)
            }
        }
    }

    pub fn write_to(&self, out: &mut impl Write) -> core::fmt::Result {
        write!(out, "<{}", self.code().to_primitive())?;
        match self {
            Command::SetSimulationMode(enabled) => write!(out, ",{}", *enabled as u8)?,
            Command::SimulatedAltitude(altitude) => write!(out, ",{:.2}", altitude)?,
            Command::SetParameter { value, .. } => write!(out, ",{}", value)?,
            _ => {}
        }
        out.write_str(">\r\n")
    }

    pub fn to_line(&self) -> String<STREAM_BUFFER_LEN> {
        let mut line = String::new();
        // the longest command is far shorter than the buffer
        let _ = self.write_to(&mut line);
        line
    }
}

/// Frame sent by the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMessage<'a> {
    /// Error number, i.e. the bit position in the error word
    ErrorLog(u8),
    RequestSimulatedAltitude { time_ms: u64 },
    SimulatedFlightState(u8),
    FlightPath { time_s: f32, altitude: f32 },
    FirmwareVersion(&'a str),
    SimulationMode(bool),
    StartedInitialization,
    FinishedInitialization,
    StartedMemoryReport,
    FinishedMemoryReport,
    Event { event: FlightEvent, time_s: f32 },
    ActuatorDischargeTime(u32),
    CapacitorRechargeTime(u32),
    WindowLength(u32),
    DeltaT(u32),
    Parameter { id: ParameterId, value: i16 },
    Apogee(f32),
}

impl<'a> OutputMessage<'a> {
    pub fn code(&self) -> OutputCode {
        match self {
            OutputMessage::ErrorLog(_) => OutputCode::ErrorLog,
            OutputMessage::RequestSimulatedAltitude { .. } => OutputCode::RequestSimulatedAltitude,
            OutputMessage::SimulatedFlightState(_) => OutputCode::SimulatedFlightState,
            OutputMessage::FlightPath { .. } => OutputCode::FlightPath,
            OutputMessage::FirmwareVersion(_) => OutputCode::FirmwareVersion,
            OutputMessage::SimulationMode(_) => OutputCode::SimulationMode,
            OutputMessage::StartedInitialization => OutputCode::StartedInitialization,
            OutputMessage::FinishedInitialization => OutputCode::FinishedInitialization,
            OutputMessage::StartedMemoryReport => OutputCode::StartedMemoryReport,
            OutputMessage::FinishedMemoryReport => OutputCode::FinishedMemoryReport,
            OutputMessage::Event { event, .. } => {
                OutputCode::from_primitive(FIRST_EVENT_OUTPUT + *event as u8)
                    .unwrap_or(OutputCode::LiftoffEvent)
            }
            OutputMessage::ActuatorDischargeTime(_) => OutputCode::ActuatorDischargeTime,
            OutputMessage::CapacitorRechargeTime(_) => OutputCode::CapacitorRechargeTime,
            OutputMessage::WindowLength(_) => OutputCode::WindowLength,
            OutputMessage::DeltaT(_) => OutputCode::DeltaT,
            OutputMessage::Parameter { id, .. } => {
                OutputCode::from_primitive(FIRST_PARAMETER_OUTPUT + id.index())
                    .unwrap_or(OutputCode::SpeedForLiftoffDetection)
            }
            OutputMessage::Apogee(_) => OutputCode::Apogee,
        }
    }

    pub fn write_to(&self, out: &mut impl Write) -> core::fmt::Result {
        write!(out, "<{}", self.code().to_primitive())?;
        match self {
            OutputMessage::ErrorLog(error) => write!(out, ",{}", error)?,
            OutputMessage::RequestSimulatedAltitude { time_ms } => write!(out, ",{}", time_ms)?,
            OutputMessage::SimulatedFlightState(phase) => write!(out, ",{}", phase)?,
            OutputMessage::FlightPath { time_s, altitude } => {
                write!(out, ",{:.1},{:.1}", time_s, altitude)?
            }
            OutputMessage::FirmwareVersion(version) => write!(out, ",{}", version)?,
            OutputMessage::SimulationMode(enabled) => write!(out, ",{}", *enabled as u8)?,
            OutputMessage::Event { time_s, .. } => write!(out, ",{:.1}", time_s)?,
            OutputMessage::ActuatorDischargeTime(value)
            | OutputMessage::CapacitorRechargeTime(value)
            | OutputMessage::WindowLength(value)
            | OutputMessage::DeltaT(value) => write!(out, ",{}", value)?,
            OutputMessage::Parameter { value, .. } => write!(out, ",{}", value)?,
            OutputMessage::Apogee(altitude) => write!(out, ",{:.1}", altitude)?,
            OutputMessage::StartedInitialization
            | OutputMessage::FinishedInitialization
            | OutputMessage::StartedMemoryReport
            | OutputMessage::FinishedMemoryReport => {}
        }
        out.write_str(">\r\n")
    }

    pub fn to_line(&self) -> String<STREAM_BUFFER_LEN> {
        let mut line = String::new();
        if self.write_to(&mut line).is_err() {
            log_warn!("telemetry frame truncated");
        }
        line
    }

    /// Reads a frame produced by [`Self::write_to`].
    pub fn decode(message: &'a RawMessage) -> Option<Self> {
        let code = OutputCode::from_primitive(message.code()?)?;
        let int = |i| message.int(i);
        let decoded = match code {
            OutputCode::ErrorLog => OutputMessage::ErrorLog(u8::try_from(int(1)?).ok()?),
            OutputCode::RequestSimulatedAltitude => OutputMessage::RequestSimulatedAltitude {
                time_ms: u64::try_from(int(1)?).ok()?,
            },
            OutputCode::SimulatedFlightState => {
                OutputMessage::SimulatedFlightState(u8::try_from(int(1)?).ok()?)
            }
            OutputCode::FlightPath => OutputMessage::FlightPath {
                time_s: message.float(1)?,
                altitude: message.float(2)?,
            },
            OutputCode::FirmwareVersion => OutputMessage::FirmwareVersion(message.field(1)?),
            OutputCode::SimulationMode => OutputMessage::SimulationMode(int(1)? != 0),
            OutputCode::StartedInitialization => OutputMessage::StartedInitialization,
            OutputCode::FinishedInitialization => OutputMessage::FinishedInitialization,
            OutputCode::StartedMemoryReport => OutputMessage::StartedMemoryReport,
            OutputCode::FinishedMemoryReport => OutputMessage::FinishedMemoryReport,
            OutputCode::LiftoffEvent
            | OutputCode::DrogueEvent
            | OutputCode::ParachuteEvent
            | OutputCode::LandedEvent => OutputMessage::Event {
                event: FlightEvent::ALL[(code.to_primitive() - FIRST_EVENT_OUTPUT) as usize],
                time_s: message.float(1)?,
            },
            OutputCode::ActuatorDischargeTime => {
                OutputMessage::ActuatorDischargeTime(u32::try_from(int(1)?).ok()?)
            }
            OutputCode::CapacitorRechargeTime => {
                OutputMessage::CapacitorRechargeTime(u32::try_from(int(1)?).ok()?)
            }
            OutputCode::WindowLength => OutputMessage::WindowLength(u32::try_from(int(1)?).ok()?),
            OutputCode::DeltaT => OutputMessage::DeltaT(u32::try_from(int(1)?).ok()?),
            OutputCode::SpeedForLiftoffDetection
            | OutputCode::SpeedForFallDetection
            | OutputCode::SpeedForApogeeDetection
            | OutputCode::ParachuteDeploymentAltitude
            | OutputCode::DisplacementForLandingDetection
            | OutputCode::MaxDeploymentAttempts
            | OutputCode::TimeStepScaler => OutputMessage::Parameter {
                id: ParameterId::from_index(code.to_primitive() - FIRST_PARAMETER_OUTPUT)?,
                value: i16::try_from(int(1)?).ok()?,
            },
            OutputCode::Apogee => OutputMessage::Apogee(message.float(1)?),
        };
        Some(decoded)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::protocol::MessageParser;

    fn raw(text: &str) -> RawMessage {
        let mut parser = MessageParser::new();
        parser.extend(text.as_bytes());
        parser.next_message().unwrap()
    }

    #[test]
    fn decodes_parameter_setters_in_field_order() {
        assert_eq!(
            Command::decode(&raw("<11,150>")),
            Ok(Command::SetParameter {
                id: ParameterId::ParachuteDeploymentAltitude,
                value: 150
            })
        );
        assert_eq!(
            Command::decode(&raw("<14,5>")),
            Ok(Command::SetParameter {
                id: ParameterId::TimeStepScaler,
                value: 5
            })
        );
    }

    #[test]
    fn decodes_simulation_commands() {
        assert_eq!(
            Command::decode(&raw("<6,1>")),
            Ok(Command::SetSimulationMode(true))
        );
        match Command::decode(&raw("<7, -12.5>")) {
            Ok(Command::SimulatedAltitude(altitude)) => assert_relative_eq!(altitude, -12.5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_frames() {
        assert_eq!(Command::decode(&raw("<x>")), Err(CommandError::MissingCode));
        assert_eq!(Command::decode(&raw("<15>")), Err(CommandError::UnknownCode(15)));
        assert_eq!(Command::decode(&raw("<-1>")), Err(CommandError::UnknownCode(-1)));
        assert_eq!(
            Command::decode(&raw("<7>")),
            Err(CommandError::MissingArgument(InputCode::SimulatedAltitude))
        );
        for altitude in ["<7,nan>", "<7,inf>", "<7,-inf>"] {
            assert_eq!(
                Command::decode(&raw(altitude)),
                Err(CommandError::InvalidArgument(InputCode::SimulatedAltitude))
            );
        }
        assert_eq!(
            Command::decode(&raw("<6,2>")),
            Err(CommandError::InvalidArgument(InputCode::SetSimulationMode))
        );
        assert_eq!(
            Command::decode(&raw("<8,40000>")),
            Err(CommandError::InvalidArgument(
                InputCode::SetSpeedForLiftoffDetection
            ))
        );
    }

    #[test]
    fn commands_encode_to_frames() {
        assert_eq!(Command::ReadFlightReport.to_line().as_str(), "<5>\r\n");
        assert_eq!(
            Command::SetParameter {
                id: ParameterId::MaxDeploymentAttempts,
                value: 4
            }
            .to_line()
            .as_str(),
            "<13,4>\r\n"
        );
        assert_eq!(Command::SimulatedAltitude(12.0).to_line().as_str(), "<7,12.00>\r\n");
    }

    #[test]
    fn telemetry_frames() {
        assert_eq!(
            OutputMessage::RequestSimulatedAltitude { time_ms: 1200 }
                .to_line()
                .as_str(),
            "<1,1200>\r\n"
        );
        assert_eq!(
            OutputMessage::Event {
                event: FlightEvent::Parachute,
                time_s: 11.2
            }
            .to_line()
            .as_str(),
            "<12,11.2>\r\n"
        );
        assert_eq!(
            OutputMessage::Parameter {
                id: ParameterId::TimeStepScaler,
                value: 10
            }
            .to_line()
            .as_str(),
            "<24,10>\r\n"
        );
        assert_eq!(OutputMessage::StartedMemoryReport.to_line().as_str(), "<8>\r\n");
    }

    #[test]
    fn telemetry_decodes_what_it_encodes() {
        let line = OutputMessage::FlightPath {
            time_s: 3.4,
            altitude: 120.5,
        }
        .to_line();
        let message = raw(&line);
        assert_eq!(
            OutputMessage::decode(&message),
            Some(OutputMessage::FlightPath {
                time_s: 3.4,
                altitude: 120.5
            })
        );

        let message = raw("<4,1.6.2-KF>");
        assert_eq!(
            OutputMessage::decode(&message),
            Some(OutputMessage::FirmwareVersion("1.6.2-KF"))
        );
        assert_eq!(OutputMessage::decode(&raw("<99>")), None);
    }
}
