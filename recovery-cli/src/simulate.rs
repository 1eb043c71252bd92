use std::{
    cell::Cell,
    io::Write,
    path::Path,
    rc::Rc,
};

use anyhow::Result;
use embedded_hal::delay::DelayNs;
use log::{info, warn};
use rand::{Rng, SeedableRng, rngs::StdRng};
use recovery_core::{
    FlightController, FlightPhase, Peripherals, RecoverySystem, StaticParameters,
    hal::{
        ActuatorIo, AltitudeSensor, ButtonInput, Clock, PyroChannel, SerialLink, StatusIndicator,
        SystemStatus,
    },
    protocol::Command,
};

use crate::{file_storage::FileStorage, trajectory::Trajectory};

/// Simulated time, shared by every peripheral of the run.
#[derive(Clone, Default)]
pub struct SimClock {
    now_ms: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn seconds(&self) -> f64 {
        self.now_ms.get() as f64 / 1000.0
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}

pub struct SimDelay(pub SimClock);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance(ns as u64 / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.advance(ms as u64);
    }
}

/// Altimeter sampling a trajectory with uniform noise of ± `noise_amplitude`.
pub struct TrajectoryAltimeter {
    clock: SimClock,
    trajectory: Trajectory,
    rng: StdRng,
    noise_amplitude: f32,
    baseline: f32,
    peak: f32,
}

impl TrajectoryAltimeter {
    pub fn new(clock: SimClock, trajectory: Trajectory, noise_amplitude: f32, seed: u64) -> Self {
        Self {
            clock,
            trajectory,
            rng: StdRng::seed_from_u64(seed),
            noise_amplitude,
            baseline: 0.0,
            peak: f32::MIN,
        }
    }
}

impl AltitudeSensor for TrajectoryAltimeter {
    fn initialize(&mut self) -> bool {
        true
    }

    fn read_altitude(&mut self) -> f32 {
        let mut altitude = self.trajectory.altitude_at(self.clock.seconds()) as f32;
        if self.noise_amplitude > 0.0 {
            altitude += self
                .rng
                .random_range(-self.noise_amplitude..=self.noise_amplitude);
        }
        let altitude = altitude - self.baseline;
        self.peak = self.peak.max(altitude);
        altitude
    }

    fn set_baseline(&mut self, offset: f32) {
        self.baseline += offset;
        self.peak -= offset;
    }

    fn peak_altitude(&self) -> f32 {
        self.peak
    }
}

/// Igniter outputs that only log their switching.
pub struct LoggingIo {
    clock: SimClock,
    pub firings: Vec<(PyroChannel, f64)>,
}

impl ActuatorIo for LoggingIo {
    fn initialize(&mut self) -> bool {
        true
    }

    fn set_output(&mut self, channel: PyroChannel, high: bool) {
        if high {
            info!("{:>7.1} s  {} igniter on", self.clock.seconds(), channel.name());
            self.firings.push((channel, self.clock.seconds()));
        }
    }
}

struct LoggingIndicator {
    last: Option<SystemStatus>,
}

impl StatusIndicator for LoggingIndicator {
    fn show(&mut self, status: SystemStatus, _now_ms: u64) {
        if self.last != Some(status) {
            info!("status {:?}", status);
            self.last = Some(status);
        }
    }
}

struct Unpressed;

impl ButtonInput for Unpressed {
    fn is_pressed(&mut self) -> bool {
        false
    }
}

/// Serial link whose output goes to a writer, nothing is ever received.
pub struct WriterLink<W: Write>(pub W);

impl<W: Write> SerialLink for WriterLink<W> {
    fn read_byte(&mut self) -> Option<u8> {
        None
    }

    fn write_all(&mut self, data: &[u8]) {
        if let Err(e) = self.0.write_all(data) {
            warn!("report output failed: {}", e);
        }
    }
}

pub struct SimulationOptions<'a> {
    pub noise_amplitude: f32,
    pub seed: u64,
    pub max_time_s: f64,
    pub csv: Option<&'a Path>,
}

pub struct SimulationOutcome {
    /// phase codes in order of appearance, with the time they were entered
    pub phases: Vec<(u8, f64)>,
    pub firings: Vec<(PyroChannel, f64)>,
    pub apogee: Option<f32>,
}

type SimSystem<W> = RecoverySystem<
    LoggingIo,
    SimClock,
    FileStorage,
    TrajectoryAltimeter,
    WriterLink<W>,
    SimDelay,
    LoggingIndicator,
    Unpressed,
>;

/// Flies the real controller through `trajectory` in simulated time, then
/// sends the flight report to `output` and saves the EEPROM image.
pub fn run_simulation<W: Write>(
    trajectory: Trajectory,
    storage: FileStorage,
    options: &SimulationOptions,
    output: W,
) -> Result<SimulationOutcome> {
    let config = StaticParameters::default();
    let delta_t_ms = config.delta_t_ms as u64;
    let clock = SimClock::default();
    let end_time_s = options.max_time_s.min(trajectory.end_time() + 60.0);

    let controller = FlightController::new(
        config,
        LoggingIo {
            clock: clock.clone(),
            firings: Vec::new(),
        },
        clock.clone(),
        storage,
    );
    let peripherals = Peripherals {
        altimeter: TrajectoryAltimeter::new(
            clock.clone(),
            trajectory,
            options.noise_amplitude,
            options.seed,
        ),
        link: WriterLink(output),
        delay: SimDelay(clock.clone()),
        indicator: LoggingIndicator { last: None },
        button: Unpressed,
    };
    let mut system: SimSystem<W> = RecoverySystem::new(controller, peripherals);
    system.begin();

    let mut phases = vec![(system.controller().phase().code(), clock.seconds())];
    let mut flown = false;
    while clock.seconds() < end_time_s {
        clock.advance(delta_t_ms);
        if !system.run_once() {
            continue;
        }
        let phase = system.controller().phase();
        if phases.last().map(|(code, _)| *code) != Some(phase.code()) {
            info!("{:>7.1} s  {}", clock.seconds(), phase.name());
            phases.push((phase.code(), clock.seconds()));
        }
        flown |= phase.is_in_flight();
        if flown && matches!(phase, FlightPhase::Recovered) {
            break;
        }
    }
    if !flown {
        warn!("no liftoff detected within {:.1} s", end_time_s);
    }

    system.handle_command(Command::ReadFlightReport);

    let apogee = system.controller().recorded_apogee();
    if let Some(path) = options.csv {
        write_flight_path(&mut system, path)?;
    }
    system.controller().log().storage().flush()?;

    Ok(SimulationOutcome {
        phases,
        firings: system.controller().io().firings.clone(),
        apogee,
    })
}

fn write_flight_path<W: Write>(system: &mut SimSystem<W>, path: &Path) -> Result<()> {
    let controller = system.controller_mut();
    let scaler = controller.flight_parameters().time_step_scaler.max(1) as u32;
    let delta_t_s = controller.config().delta_t_s();

    let mut csv_writer = csv::Writer::from_path(path)?;
    csv_writer.write_record(["time_s", "altitude_m"])?;
    for sample in controller.log_mut().flight_path(scaler) {
        let time_s = sample.offset_ticks as f32 * delta_t_s;
        csv_writer.write_record([format!("{:.1}", time_s), format!("{:.1}", sample.altitude)])?;
    }
    csv_writer.flush()?;
    info!("flight path written to {}", path.display());
    Ok(())
}
