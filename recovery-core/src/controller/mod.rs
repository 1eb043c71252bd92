use embedded_hal::delay::DelayNs;
use heapless::Deque;

use crate::{
    actuator::DeploymentActuator,
    error_flags::ErrorFlags,
    estimator::KinematicEstimator,
    flight_log::{FlightEvent, FlightLog},
    hal::{
        ActuatorIo, AltitudeSensor, Clock, NonVolatileStorage, PyroChannel, StatusIndicator,
        SystemStatus,
    },
    params::{DEFAULT_WINDOW_LEN, FlightParameters, ParameterError, ParameterId, StaticParameters},
};

mod conditions;

pub use conditions::{FlightConditions, RollingWindow};

const INITIALIZATION_RETRY_DELAY_MS: u32 = 100;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightPhase {
    ReadyToLaunch,
    Flying,
    DrogueActive {
        drogue: DeploymentActuator,
        /// decimated logging is counted from this tick
        drogue_tick: u64,
    },
    ParachuteActive {
        drogue: DeploymentActuator,
        parachute: DeploymentActuator,
        drogue_tick: u64,
    },
    Recovered,
}

impl FlightPhase {
    /// Numeric phase code used on the telemetry link.
    pub fn code(&self) -> u8 {
        match self {
            FlightPhase::ReadyToLaunch => 0,
            FlightPhase::Flying => 1,
            FlightPhase::DrogueActive { .. } => 2,
            FlightPhase::ParachuteActive { .. } => 3,
            FlightPhase::Recovered => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlightPhase::ReadyToLaunch => "ready to launch",
            FlightPhase::Flying => "flying",
            FlightPhase::DrogueActive { .. } => "drogue active",
            FlightPhase::ParachuteActive { .. } => "parachute active",
            FlightPhase::Recovered => "recovered",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        !matches!(self, FlightPhase::ReadyToLaunch | FlightPhase::Recovered)
    }
}

enum Transition {
    Liftoff,
    Drogue,
    Parachute,
    Landed,
    Rearm,
}

/// Pre-liftoff samples waiting to be written into their reserved slots.
struct Backlog<const N: usize> {
    samples: Deque<f32, N>,
    next_slot: usize,
}

impl<const N: usize> Backlog<N> {
    fn new() -> Self {
        Self {
            samples: Deque::new(),
            next_slot: 0,
        }
    }
}

/// Flight phase state machine.
///
/// Owns the rolling window, the estimator and the flight log, and drives both
/// recovery channels. The altimeter is borrowed per call so that the caller
/// can share it with a telemetry link in simulation mode.
pub struct FlightController<A, C, S, const N: usize = DEFAULT_WINDOW_LEN>
where
    A: ActuatorIo,
    C: Clock,
    S: NonVolatileStorage,
{
    config: StaticParameters,
    params: FlightParameters,
    io: A,
    clock: C,
    log: FlightLog<S>,
    estimator: KinematicEstimator,
    window: RollingWindow<N>,
    conditions: FlightConditions,
    phase: FlightPhase,
    /// ticks elapsed since the clock epoch
    tick: u64,
    /// tick of the oldest sample committed at liftoff
    flight_origin_tick: u64,
    backlog: Backlog<N>,
    apogee: Option<f32>,
}

impl<A, C, S, const N: usize> FlightController<A, C, S, N>
where
    A: ActuatorIo,
    C: Clock,
    S: NonVolatileStorage,
{
    pub fn new(config: StaticParameters, io: A, clock: C, storage: S) -> Self {
        const { assert!(N > 0 && N % 4 == 0, "window length must be a multiple of 4") };

        let mut log = FlightLog::new(storage);
        let params = match log.read_flight_parameters() {
            Ok(params) => params,
            Err(e) => {
                log_warn!("stored flight parameters rejected ({}), restoring defaults", e);
                let params = FlightParameters::default();
                log.write_flight_parameters(&params);
                params
            }
        };
        let phase = Self::phase_from_log(&log);

        Self {
            estimator: KinematicEstimator::new(config.estimator, config.delta_t_s(), 0.0),
            config,
            params,
            io,
            clock,
            log,
            window: RollingWindow::new(),
            conditions: FlightConditions::default(),
            phase,
            tick: 0,
            flight_origin_tick: 0,
            backlog: Backlog::new(),
            apogee: None,
        }
    }

    fn phase_from_log(log: &FlightLog<S>) -> FlightPhase {
        if log.has_flight() {
            FlightPhase::Recovered
        } else {
            FlightPhase::ReadyToLaunch
        }
    }

    /// Brings the hardware up and fills the rolling window.
    ///
    /// Sensor and actuator initialization are retried until they succeed,
    /// each failure is recorded in the flight log and shown on `indicator`.
    pub fn begin(
        &mut self,
        sensor: &mut impl AltitudeSensor,
        delay: &mut impl DelayNs,
        indicator: &mut impl StatusIndicator,
    ) {
        self.phase = Self::phase_from_log(&self.log);
        log_info!("starting in phase {}", self.phase.name());

        while !sensor.initialize() {
            log_error!("altimeter initialization failed, retrying");
            self.log
                .write_error_flags(ErrorFlags::BAROMETER_INITIALIZATION_FAILURE);
            indicator.show(SystemStatus::SensorFailure, self.clock.now_ms());
            delay.delay_ms(INITIALIZATION_RETRY_DELAY_MS);
        }

        while !self.io.initialize() {
            log_error!("actuator initialization failed, retrying");
            self.log
                .write_error_flags(ErrorFlags::ACTUATOR_INITIALIZATION_FAILURE);
            indicator.show(SystemStatus::ActuatorFailure, self.clock.now_ms());
            delay.delay_ms(INITIALIZATION_RETRY_DELAY_MS);
        }
        self.io.set_output(PyroChannel::Drogue, false);
        self.io.set_output(PyroChannel::Parachute, false);

        indicator.show(SystemStatus::Initializing, self.clock.now_ms());
        self.window.clear();
        for _ in 0..=N {
            delay.delay_ms(self.config.delta_t_ms);
            self.window.push(sensor.read_altitude());
        }
        self.estimator.reset(self.window.latest());
        self.conditions = FlightConditions::evaluate(&self.params, &self.estimator, &self.window);
        self.backlog = Backlog::new();
        self.apogee = None;
        self.tick = self.clock.now_ms() / self.config.delta_t_ms as u64;
        log_info!("initialization finished at tick {}", self.tick);
    }

    /// Runs at most one tick. Returns true if a tick was run.
    ///
    /// Calls before the next tick is due do nothing, a late caller catches
    /// up one tick per call.
    pub fn poll(&mut self, sensor: &mut impl AltitudeSensor) -> bool {
        let due = self.clock.now_ms() / self.config.delta_t_ms as u64;
        if due <= self.tick {
            return false;
        }
        self.tick += 1;
        self.run_tick(sensor);
        true
    }

    fn run_tick(&mut self, sensor: &mut impl AltitudeSensor) {
        let altitude = sensor.read_altitude();
        self.window.push(altitude);
        self.estimator.process(altitude);
        self.conditions = FlightConditions::evaluate(&self.params, &self.estimator, &self.window);
        log_trace!(
            "tick {}: altitude {} vs {}",
            self.tick,
            altitude,
            self.estimator.smoothed_velocity()
        );

        self.flush_backlog();

        let committed = match self.step_phase() {
            Some(transition) => self.apply(transition, sensor),
            None => false,
        };
        if !committed && self.should_log() {
            self.log.append_altitude(self.window.latest());
        }
    }

    /// Runs the deployment cycles of the current phase and picks the
    /// transition to take, if any.
    fn step_phase(&mut self) -> Option<Transition> {
        let now_ms = self.clock.now_ms();
        let c = self.conditions;
        let max_attempts = self.params.max_attempts();

        match &mut self.phase {
            FlightPhase::ReadyToLaunch => c.liftoff.then_some(Transition::Liftoff),
            FlightPhase::Flying => (c.apogee || c.fall).then_some(Transition::Drogue),
            FlightPhase::DrogueActive { drogue, .. } => {
                let target = c.parachute_deployment || c.landing;
                let stop = target || drogue.deploy_count() >= max_attempts;
                let finished = drogue.deploy(&mut self.io, now_ms, stop);
                (finished && target).then_some(Transition::Parachute)
            }
            FlightPhase::ParachuteActive { parachute, .. } => {
                let stop = c.landing || parachute.deploy_count() >= max_attempts;
                parachute.deploy(&mut self.io, now_ms, stop);
                c.landing.then_some(Transition::Landed)
            }
            FlightPhase::Recovered => c.is_moving().then_some(Transition::Rearm),
        }
    }

    /// Returns true when the transition already committed this tick's sample.
    fn apply(&mut self, transition: Transition, sensor: &mut impl AltitudeSensor) -> bool {
        let now_ms = self.clock.now_ms();
        match transition {
            Transition::Liftoff => {
                self.enter_flying(sensor);
                true
            }
            Transition::Rearm => {
                log_warn!("motion detected while recovered, restarting the flight log");
                self.log.erase();
                self.log
                    .write_error_flags(ErrorFlags::FLIGHT_STARTED_WITH_NON_EMPTY_MEMORY);
                self.enter_flying(sensor);
                true
            }
            Transition::Drogue => {
                let mut drogue = self.new_actuator(PyroChannel::Drogue);
                drogue.reload(&mut self.io);
                drogue.deploy(&mut self.io, now_ms, false);
                let apogee = sensor.peak_altitude();
                self.apogee = Some(apogee);
                self.record_event(FlightEvent::Drogue);
                log_info!("apogee at {} m, drogue deployed", apogee);
                self.phase = FlightPhase::DrogueActive {
                    drogue,
                    drogue_tick: self.tick,
                };
                false
            }
            Transition::Parachute => {
                let FlightPhase::DrogueActive {
                    drogue,
                    drogue_tick,
                } = core::mem::replace(&mut self.phase, FlightPhase::Flying)
                else {
                    return false;
                };
                let mut parachute = self.new_actuator(PyroChannel::Parachute);
                parachute.reload(&mut self.io);
                parachute.deploy(&mut self.io, now_ms, false);
                self.record_event(FlightEvent::Parachute);
                log_info!("parachute deployed at {} m", self.window.latest());
                self.phase = FlightPhase::ParachuteActive {
                    drogue,
                    parachute,
                    drogue_tick,
                };
                false
            }
            Transition::Landed => {
                if let FlightPhase::ParachuteActive {
                    drogue, parachute, ..
                } = &mut self.phase
                {
                    drogue.reload(&mut self.io);
                    parachute.reload(&mut self.io);
                }
                self.record_event(FlightEvent::Landed);
                log_info!("landed");
                self.phase = FlightPhase::Recovered;
                false
            }
        }
    }

    /// Shared entry into `Flying`, from the pad or from a reset in flight.
    ///
    /// The window is re-baselined on its oldest sample and committed to the
    /// log: the latest sample right away, the older ones one per tick.
    fn enter_flying(&mut self, sensor: &mut impl AltitudeSensor) {
        let baseline = self.window.oldest();
        sensor.set_baseline(baseline);
        self.window.shift(baseline);
        self.estimator.shift_origin(baseline);

        let slots = self.log.reserve_slots(N + 1);
        if slots.len() == N + 1 {
            self.log.write_altitude(slots.end - 1, self.window.latest());
        }
        self.backlog.samples.clear();
        for altitude in self.window.older().take(slots.len()) {
            // capacity is N, older() yields N samples at most
            let _ = self.backlog.samples.push_back(altitude);
        }
        self.backlog.next_slot = slots.start;

        // the report rebuilds decimated timestamps from the stored parameters
        if self.log.read_flight_parameters() != Ok(self.params) {
            self.log.write_flight_parameters(&self.params);
        }

        self.flight_origin_tick = self.tick.saturating_sub(N as u64);
        self.record_event(FlightEvent::Liftoff);
        self.phase = FlightPhase::Flying;
        log_info!(
            "liftoff detected, baseline moved by {} m, {} samples reserved",
            baseline,
            slots.len()
        );
    }

    fn flush_backlog(&mut self) {
        if let Some(altitude) = self.backlog.samples.pop_front() {
            self.log.write_altitude(self.backlog.next_slot, altitude);
            self.backlog.next_slot += 1;
        }
    }

    fn should_log(&self) -> bool {
        match &self.phase {
            FlightPhase::Flying => true,
            FlightPhase::DrogueActive { drogue_tick, .. }
            | FlightPhase::ParachuteActive { drogue_tick, .. } => {
                (self.tick - drogue_tick) % self.params.log_decimation() as u64 == 0
            }
            FlightPhase::ReadyToLaunch | FlightPhase::Recovered => false,
        }
    }

    fn record_event(&mut self, event: FlightEvent) {
        let offset = (self.tick - self.flight_origin_tick).min(u16::MAX as u64) as u16;
        self.log.write_event(event, offset);
    }

    fn new_actuator(&self, channel: PyroChannel) -> DeploymentActuator {
        DeploymentActuator::new(
            channel,
            self.config.actuator_discharge_time_ms,
            self.config.capacitor_recharge_time_ms,
        )
    }

    pub fn status(&self) -> SystemStatus {
        match self.phase {
            FlightPhase::ReadyToLaunch => SystemStatus::ReadyToLaunch,
            FlightPhase::Recovered => SystemStatus::Recovered,
            _ => SystemStatus::Flying,
        }
    }

    pub fn phase(&self) -> &FlightPhase {
        &self.phase
    }

    pub fn conditions(&self) -> FlightConditions {
        self.conditions
    }

    pub fn estimator(&self) -> &KinematicEstimator {
        &self.estimator
    }

    pub fn window(&self) -> &RollingWindow<N> {
        &self.window
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Peak altitude reported by the altimeter when the drogue fired.
    pub fn recorded_apogee(&self) -> Option<f32> {
        self.apogee
    }

    pub fn config(&self) -> &StaticParameters {
        &self.config
    }

    pub fn flight_parameters(&self) -> &FlightParameters {
        &self.params
    }

    /// Changes one parameter for the current session, see
    /// [`Self::persist_flight_parameters`].
    pub fn set_flight_parameter(&mut self, id: ParameterId, value: i16) -> Result<(), ParameterError> {
        self.params.set(id, value)?;
        log_info!("{} set to {}", id.name(), value);
        Ok(())
    }

    pub fn persist_flight_parameters(&mut self) {
        self.log.write_flight_parameters(&self.params);
    }

    /// Reloads the persisted parameters, or the defaults if none are stored.
    pub fn reload_flight_parameters(&mut self) {
        self.params = self.log.read_flight_parameters().unwrap_or_default();
    }

    pub fn restore_factory_parameters(&mut self) {
        self.params = FlightParameters::default();
        self.log.write_flight_parameters(&self.params);
        log_info!("factory flight parameters restored");
    }

    /// Forgets the recorded flight and waits for a new liftoff. Ignored
    /// while in flight.
    pub fn erase_flight_log(&mut self) -> bool {
        if self.phase.is_in_flight() {
            log_warn!("refusing to erase the flight log in flight");
            return false;
        }
        self.log.erase();
        self.apogee = None;
        self.phase = FlightPhase::ReadyToLaunch;
        true
    }

    pub fn log(&self) -> &FlightLog<S> {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut FlightLog<S> {
        &mut self.log
    }

    pub fn io(&self) -> &A {
        &self.io
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
