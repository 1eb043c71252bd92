// only use std when feature = "std" is enabled or during testing
#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod fmt;

pub mod actuator;
pub mod button;
pub mod controller;
pub mod error_flags;
pub mod estimator;
pub mod flight_log;
pub mod hal;
pub mod params;
pub mod protocol;
pub mod report;
pub mod simulation;
pub mod supervisor;

pub use actuator::DeploymentActuator;
pub use controller::{FlightConditions, FlightController, FlightPhase, RollingWindow};
pub use error_flags::ErrorFlags;
pub use estimator::{EstimatorTuning, KinematicEstimator};
pub use flight_log::{FlightEvent, FlightLog, FlightPathSample};
pub use params::{FlightParameters, ParameterError, ParameterId, StaticParameters};
pub use supervisor::{Peripherals, RecoverySystem};

#[cfg(test)]
mod tests;
