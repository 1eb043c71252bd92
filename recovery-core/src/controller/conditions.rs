use heapless::HistoryBuffer;

use crate::{estimator::KinematicEstimator, params::FlightParameters};

/// The last `N + 1` altitude samples, oldest first.
#[derive(Debug, Clone)]
pub struct RollingWindow<const N: usize> {
    older: HistoryBuffer<f32, N>,
    latest: f32,
    filled: bool,
}

impl<const N: usize> RollingWindow<N> {
    pub fn new() -> Self {
        Self {
            older: HistoryBuffer::new(),
            latest: 0.0,
            filled: false,
        }
    }

    /// Shifts `altitude` in, dropping the oldest sample once the window is full.
    pub fn push(&mut self, altitude: f32) {
        if self.filled {
            self.older.write(self.latest);
        }
        self.latest = altitude;
        self.filled = true;
    }

    pub fn latest(&self) -> f32 {
        self.latest
    }

    pub fn oldest(&self) -> f32 {
        self.older.oldest_ordered().next().copied().unwrap_or(self.latest)
    }

    /// Number of samples held, `N + 1` once filled.
    pub fn len(&self) -> usize {
        self.older.len() + self.filled as usize
    }

    pub fn is_full(&self) -> bool {
        self.len() == N + 1
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.older
            .oldest_ordered()
            .copied()
            .chain(self.filled.then_some(self.latest))
    }

    /// Samples before the latest one, oldest first.
    pub fn older(&self) -> impl Iterator<Item = f32> + '_ {
        self.older.oldest_ordered().copied()
    }

    /// Spread between the highest and lowest sample.
    pub fn displacement(&self) -> f32 {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for altitude in self.iter() {
            min = min.min(altitude);
            max = max.max(altitude);
        }
        if min > max { 0.0 } else { max - min }
    }

    /// Subtracts `offset` from every sample.
    pub fn shift(&mut self, offset: f32) {
        let mut shifted = HistoryBuffer::new();
        for altitude in self.older.oldest_ordered() {
            shifted.write(altitude - offset);
        }
        self.older = shifted;
        self.latest -= offset;
    }

    pub fn clear(&mut self) {
        self.older.clear();
        self.latest = 0.0;
        self.filled = false;
    }
}

impl<const N: usize> Default for RollingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Flight conditions, recomputed from scratch every tick.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlightConditions {
    pub liftoff: bool,
    pub fall: bool,
    pub apogee: bool,
    pub parachute_deployment: bool,
    pub landing: bool,
}

impl FlightConditions {
    pub fn evaluate<const N: usize>(
        params: &FlightParameters,
        estimator: &KinematicEstimator,
        window: &RollingWindow<N>,
    ) -> Self {
        let vs = estimator.smoothed_velocity();
        let liftoff = vs > params.speed_for_liftoff_detection as f32;
        let fall = -vs > params.speed_for_fall_detection as f32;
        let apogee = vs < params.speed_for_apogee_detection as f32;
        let parachute_deployment = window.latest() <= params.parachute_deployment_altitude as f32;
        // a vehicle still moving fast cannot have landed
        let landing = !(liftoff || fall)
            && window.displacement() < params.displacement_for_landing_detection as f32;

        Self {
            liftoff,
            fall,
            apogee,
            parachute_deployment,
            landing,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.liftoff || self.fall
    }
}
