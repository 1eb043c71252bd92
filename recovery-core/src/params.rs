use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};

use crate::estimator::EstimatorTuning;

/// Number of samples in the liftoff window is `DEFAULT_WINDOW_LEN + 1`.
pub const DEFAULT_WINDOW_LEN: usize = 32;

pub const FIRMWARE_VERSION: &str = "1.6.2-KF";

/// User tunable flight parameters, persisted at the start of the flight log.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(PackedStruct, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "14")]
pub struct FlightParameters {
    /// m/s, smoothed velocity above this means the vehicle lifted off
    pub speed_for_liftoff_detection: i16,
    /// m/s, smoothed velocity below the negated value means the vehicle is falling
    pub speed_for_fall_detection: i16,
    /// m/s
    pub speed_for_apogee_detection: i16,
    /// m above the launch site
    pub parachute_deployment_altitude: i16,
    /// m, spread of the window below which the vehicle is considered landed
    pub displacement_for_landing_detection: i16,
    pub max_deployment_attempts: i16,
    /// Only every n-th sample is logged once the drogue has fired.
    pub time_step_scaler: i16,
}

impl FlightParameters {
    pub const PACKED_LEN: usize = 14;

    pub fn get(&self, id: ParameterId) -> i16 {
        match id {
            ParameterId::SpeedForLiftoffDetection => self.speed_for_liftoff_detection,
            ParameterId::SpeedForFallDetection => self.speed_for_fall_detection,
            ParameterId::SpeedForApogeeDetection => self.speed_for_apogee_detection,
            ParameterId::ParachuteDeploymentAltitude => self.parachute_deployment_altitude,
            ParameterId::DisplacementForLandingDetection => {
                self.displacement_for_landing_detection
            }
            ParameterId::MaxDeploymentAttempts => self.max_deployment_attempts,
            ParameterId::TimeStepScaler => self.time_step_scaler,
        }
    }

    /// Changes one parameter, rejecting values that would leave the
    /// controller unable to deploy or log.
    pub fn set(&mut self, id: ParameterId, value: i16) -> Result<(), ParameterError> {
        let mut updated = *self;
        match id {
            ParameterId::SpeedForLiftoffDetection => updated.speed_for_liftoff_detection = value,
            ParameterId::SpeedForFallDetection => updated.speed_for_fall_detection = value,
            ParameterId::SpeedForApogeeDetection => updated.speed_for_apogee_detection = value,
            ParameterId::ParachuteDeploymentAltitude => {
                updated.parachute_deployment_altitude = value
            }
            ParameterId::DisplacementForLandingDetection => {
                updated.displacement_for_landing_detection = value
            }
            ParameterId::MaxDeploymentAttempts => updated.max_deployment_attempts = value,
            ParameterId::TimeStepScaler => updated.time_step_scaler = value,
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        for id in ParameterId::ALL {
            let value = self.get(id);
            let valid = match id {
                ParameterId::SpeedForLiftoffDetection
                | ParameterId::SpeedForFallDetection
                | ParameterId::DisplacementForLandingDetection
                | ParameterId::MaxDeploymentAttempts
                | ParameterId::TimeStepScaler => value > 0,
                ParameterId::SpeedForApogeeDetection
                | ParameterId::ParachuteDeploymentAltitude => true,
            };
            if !valid {
                return Err(ParameterError::NotPositive { id, value });
            }
        }
        Ok(())
    }

    pub(crate) fn max_attempts(&self) -> u16 {
        self.max_deployment_attempts.max(1) as u16
    }

    pub(crate) fn log_decimation(&self) -> u32 {
        self.time_step_scaler.max(1) as u32
    }
}

impl Default for FlightParameters {
    fn default() -> Self {
        Self {
            speed_for_liftoff_detection: 30,
            speed_for_fall_detection: 30,
            speed_for_apogee_detection: 3,
            parachute_deployment_altitude: 200,
            displacement_for_landing_detection: 3,
            max_deployment_attempts: 3,
            time_step_scaler: 10,
        }
    }
}

/// Index of a dynamic parameter, in persisted field order.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterId {
    SpeedForLiftoffDetection,
    SpeedForFallDetection,
    SpeedForApogeeDetection,
    ParachuteDeploymentAltitude,
    DisplacementForLandingDetection,
    MaxDeploymentAttempts,
    TimeStepScaler,
}

impl ParameterId {
    pub const ALL: [ParameterId; 7] = [
        ParameterId::SpeedForLiftoffDetection,
        ParameterId::SpeedForFallDetection,
        ParameterId::SpeedForApogeeDetection,
        ParameterId::ParachuteDeploymentAltitude,
        ParameterId::DisplacementForLandingDetection,
        ParameterId::MaxDeploymentAttempts,
        ParameterId::TimeStepScaler,
    ];

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParameterId::SpeedForLiftoffDetection => "speed_for_liftoff_detection",
            ParameterId::SpeedForFallDetection => "speed_for_fall_detection",
            ParameterId::SpeedForApogeeDetection => "speed_for_apogee_detection",
            ParameterId::ParachuteDeploymentAltitude => "parachute_deployment_altitude",
            ParameterId::DisplacementForLandingDetection => "displacement_for_landing_detection",
            ParameterId::MaxDeploymentAttempts => "max_deployment_attempts",
            ParameterId::TimeStepScaler => "time_step_scaler",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterError {
    NotPositive { id: ParameterId, value: i16 },
}

impl core::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParameterError::NotPositive { id, value } => {
                write!(f, "{} must be positive, got {}", id.name(), value)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParameterError {}

/// Compile time configuration of the board.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticParameters {
    pub firmware_version: &'static str,
    /// Tick period
    pub delta_t_ms: u32,
    pub actuator_discharge_time_ms: u32,
    pub capacitor_recharge_time_ms: u32,
    pub estimator: EstimatorTuning,
}

impl Default for StaticParameters {
    fn default() -> Self {
        Self {
            firmware_version: FIRMWARE_VERSION,
            delta_t_ms: 100,
            actuator_discharge_time_ms: 500,
            capacitor_recharge_time_ms: 1000,
            estimator: EstimatorTuning::default(),
        }
    }
}

impl StaticParameters {
    pub fn delta_t_s(&self) -> f32 {
        self.delta_t_ms as f32 / 1000.0
    }
}
