use std::{f64::consts::PI, path::Path};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

const G: f64 = 9.8;

/// Ballistic flight: constant thrust, then free fall until the rocket comes
/// to rest at `final_altitude`. Optional sinusoidal perturbations before
/// ignition, during the ascent and during the descent stress the detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticFlight {
    pub ignition_time_s: f64,
    pub propulsion_time_s: f64,
    pub propulsion_acceleration: f64,
    pub final_altitude: f64,
    pub noise_amplitude: f32,
    pub perturbation: bool,
    pub perturbation_amplitude: f64,
    pub perturbation_period_s: f64,
}

impl Default for SyntheticFlight {
    fn default() -> Self {
        Self {
            ignition_time_s: 20.0,
            propulsion_time_s: 3.0,
            propulsion_acceleration: 2.0 * G,
            final_altitude: 40.0,
            noise_amplitude: 1.0,
            perturbation: false,
            perturbation_amplitude: 50.0,
            perturbation_period_s: 1.2,
        }
    }
}

impl SyntheticFlight {
    fn burnout_time(&self) -> f64 {
        self.ignition_time_s + self.propulsion_time_s
    }

    fn burnout_altitude(&self) -> f64 {
        0.5 * self.propulsion_acceleration * self.propulsion_time_s.powi(2)
    }

    fn burnout_velocity(&self) -> f64 {
        self.propulsion_acceleration * self.propulsion_time_s
    }

    pub fn apogee_time(&self) -> f64 {
        self.burnout_time() + self.burnout_velocity() / G
    }

    pub fn apogee(&self) -> f64 {
        self.burnout_altitude() + self.burnout_velocity().powi(2) / (2.0 * G)
    }

    pub fn touchdown_time(&self) -> f64 {
        let v = self.burnout_velocity();
        let drop = self.burnout_altitude() - self.final_altitude;
        self.burnout_time() + (v + (v * v + 2.0 * G * drop).sqrt()) / G
    }

    fn baseline(&self, t: f64) -> f64 {
        if t < self.ignition_time_s {
            0.0
        } else if t < self.burnout_time() {
            0.5 * self.propulsion_acceleration * (t - self.ignition_time_s).powi(2)
        } else if t < self.touchdown_time() {
            let dt = t - self.burnout_time();
            self.burnout_altitude() + self.burnout_velocity() * dt - 0.5 * G * dt * dt
        } else {
            self.final_altitude
        }
    }

    fn perturbation(&self, t: f64) -> f64 {
        if !self.perturbation {
            return 0.0;
        }
        let wave = |start: f64, end: f64| {
            if (start..=end).contains(&t) {
                self.perturbation_amplitude * (2.0 * PI * (t - start) / self.perturbation_period_s).sin()
            } else {
                0.0
            }
        };
        let on_pad = self.ignition_time_s / 3.0;
        wave(on_pad, on_pad + self.perturbation_period_s)
            + wave(self.ignition_time_s, 0.8 * self.apogee_time())
            + wave(1.2 * self.apogee_time(), self.touchdown_time())
    }

    pub fn altitude_at(&self, t: f64) -> f64 {
        self.baseline(t) + self.perturbation(t)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct TrajectoryPoint {
    time_s: f64,
    altitude: f64,
}

/// Recorded or exported trajectory, linearly interpolated and held constant
/// outside of its time range.
#[derive(Debug, Clone)]
pub struct TrajectoryTable {
    points: Vec<TrajectoryPoint>,
}

impl TrajectoryTable {
    /// Reads `time_s,altitude` rows, `#` starts a comment line.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(path)?;
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut points: Vec<TrajectoryPoint> = Vec::new();
        for record in reader.deserialize() {
            let point: TrajectoryPoint = record?;
            if let Some(last) = points.last() {
                if point.time_s <= last.time_s {
                    bail!("trajectory time must increase, {} after {}", point.time_s, last.time_s);
                }
            }
            points.push(point);
        }
        if points.is_empty() {
            bail!("empty trajectory");
        }
        Ok(Self { points })
    }

    pub fn duration(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time_s)
    }

    pub fn altitude_at(&self, t: f64) -> f64 {
        let next = self.points.partition_point(|p| p.time_s <= t);
        match (next.checked_sub(1).map(|i| self.points[i]), self.points.get(next)) {
            (None, Some(first)) => first.altitude,
            (Some(last), None) => last.altitude,
            (Some(a), Some(b)) => {
                a.altitude + (b.altitude - a.altitude) * (t - a.time_s) / (b.time_s - a.time_s)
            }
            (None, None) => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Trajectory {
    Synthetic(SyntheticFlight),
    Table(TrajectoryTable),
}

impl Trajectory {
    pub fn altitude_at(&self, t: f64) -> f64 {
        match self {
            Trajectory::Synthetic(flight) => flight.altitude_at(t),
            Trajectory::Table(table) => table.altitude_at(t),
        }
    }

    /// Time after which nothing changes anymore.
    pub fn end_time(&self) -> f64 {
        match self {
            Trajectory::Synthetic(flight) => flight.touchdown_time(),
            Trajectory::Table(table) => table.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn table(text: &str) -> Result<TrajectoryTable> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        TrajectoryTable::from_reader(reader)
    }

    #[test]
    fn table_is_interpolated_and_clamped() {
        let table = table("# time, altitude\n0, 0\n1.0, 10\n3.0, 50\n").unwrap();
        assert_relative_eq!(table.altitude_at(-1.0), 0.0);
        assert_relative_eq!(table.altitude_at(0.5), 5.0);
        assert_relative_eq!(table.altitude_at(2.0), 30.0);
        assert_relative_eq!(table.altitude_at(3.0), 50.0);
        assert_relative_eq!(table.altitude_at(10.0), 50.0);
        assert_relative_eq!(table.duration(), 3.0);
    }

    #[test]
    fn table_rejects_unordered_time() {
        assert!(table("0,0\n2,10\n1,5\n").is_err());
        assert!(table("# nothing\n").is_err());
    }

    #[test]
    fn synthetic_flight_is_continuous() {
        let flight = SyntheticFlight::default();
        // 2 g for 3 s: 88.2 m at burnout, 58.8 m/s
        assert_relative_eq!(flight.apogee(), 264.6, epsilon = 1e-6);
        assert_relative_eq!(flight.altitude_at(flight.apogee_time()), 264.6, epsilon = 1e-6);
        assert_relative_eq!(flight.altitude_at(flight.burnout_time()), 88.2, epsilon = 1e-6);

        let touchdown = flight.touchdown_time();
        assert_relative_eq!(flight.altitude_at(touchdown - 1e-9), 40.0, epsilon = 1e-3);
        assert_relative_eq!(flight.altitude_at(touchdown + 5.0), 40.0);
        assert_relative_eq!(flight.altitude_at(5.0), 0.0);
    }

    #[test]
    fn perturbation_only_when_enabled() {
        let mut flight = SyntheticFlight::default();
        let t = flight.ignition_time_s / 3.0 + flight.perturbation_period_s / 4.0;
        assert_relative_eq!(flight.altitude_at(t), 0.0);
        flight.perturbation = true;
        assert_relative_eq!(flight.altitude_at(t), 50.0, epsilon = 1e-9);
    }
}
