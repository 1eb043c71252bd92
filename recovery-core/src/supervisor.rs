use embedded_hal::delay::DelayNs;

use crate::{
    button::{Button, ButtonState},
    controller::{FlightController, FlightPhase},
    hal::{
        ActuatorIo, AltitudeSensor, ButtonInput, Clock, NonVolatileStorage, SerialLink,
        StatusIndicator,
    },
    params::DEFAULT_WINDOW_LEN,
    protocol::{Command, MessageParser, OutputMessage},
    report::{send, send_dynamic_parameters, send_flight_report, send_static_parameters},
    simulation::{DEFAULT_SIMULATION_TIMEOUT_MS, SimulatedAltimeter},
};

/// Peripherals the supervisor drives besides the controller.
pub struct Peripherals<H, L, D, I, B>
where
    H: AltitudeSensor,
    L: SerialLink,
    D: DelayNs,
    I: StatusIndicator,
    B: ButtonInput,
{
    pub altimeter: H,
    pub link: L,
    pub delay: D,
    pub indicator: I,
    pub button: B,
}

/// Main loop of the flight computer.
///
/// Boots the controller, serves ground commands, runs ticks from the hardware
/// altimeter or, in simulation mode, from altitudes sent over the link, and
/// handles the button once the rocket is recovered: a short press sends the
/// flight report, a long press erases the log and restarts.
pub struct RecoverySystem<A, C, S, H, L, D, I, B, const N: usize = DEFAULT_WINDOW_LEN>
where
    A: ActuatorIo,
    C: Clock,
    S: NonVolatileStorage,
    H: AltitudeSensor,
    L: SerialLink,
    D: DelayNs,
    I: StatusIndicator,
    B: ButtonInput,
{
    controller: FlightController<A, C, S, N>,
    clock: C,
    altimeter: H,
    link: L,
    parser: MessageParser,
    delay: D,
    indicator: I,
    button: Button<B>,
    simulation: Option<SimulatedAltimeter>,
    simulation_timeout_ms: u64,
}

impl<A, C, S, H, L, D, I, B, const N: usize> RecoverySystem<A, C, S, H, L, D, I, B, N>
where
    A: ActuatorIo,
    C: Clock,
    S: NonVolatileStorage,
    H: AltitudeSensor,
    L: SerialLink,
    D: DelayNs,
    I: StatusIndicator,
    B: ButtonInput,
{
    pub fn new(
        controller: FlightController<A, C, S, N>,
        peripherals: Peripherals<H, L, D, I, B>,
    ) -> Self {
        Self {
            clock: controller.clock().clone(),
            controller,
            altimeter: peripherals.altimeter,
            link: peripherals.link,
            parser: MessageParser::new(),
            delay: peripherals.delay,
            indicator: peripherals.indicator,
            button: Button::new(peripherals.button),
            simulation: None,
            simulation_timeout_ms: DEFAULT_SIMULATION_TIMEOUT_MS,
        }
    }

    pub fn with_simulation_timeout(mut self, timeout_ms: u64) -> Self {
        self.simulation_timeout_ms = timeout_ms;
        self
    }

    /// Initializes the controller from whichever altimeter is active.
    pub fn begin(&mut self) {
        send(&mut self.link, &OutputMessage::StartedInitialization);
        match &mut self.simulation {
            Some(simulation) => {
                simulation.reset();
                let mut altimeter = simulation.bind(&mut self.link, &mut self.parser, &self.clock);
                self.controller
                    .begin(&mut altimeter, &mut self.delay, &mut self.indicator);
            }
            None => {
                self.controller
                    .begin(&mut self.altimeter, &mut self.delay, &mut self.indicator);
            }
        }
        send(
            &mut self.link,
            &OutputMessage::FirmwareVersion(self.controller.config().firmware_version),
        );
        send(&mut self.link, &OutputMessage::FinishedInitialization);
        self.indicator
            .show(self.controller.status(), self.clock.now_ms());
    }

    /// One main loop iteration. Returns true if a controller tick ran.
    pub fn run_once(&mut self) -> bool {
        self.process_link();

        let ticked = match &mut self.simulation {
            Some(simulation) => {
                let mut altimeter = simulation.bind(&mut self.link, &mut self.parser, &self.clock);
                self.controller.poll(&mut altimeter)
            }
            None => self.controller.poll(&mut self.altimeter),
        };
        // commands that arrived while the tick waited for an altitude
        while let Some(command) = self.simulation.as_mut().and_then(|s| s.take_deferred()) {
            self.handle_command(command);
        }
        if ticked && self.simulation.is_some() {
            let phase = self.controller.phase().code();
            send(&mut self.link, &OutputMessage::SimulatedFlightState(phase));
        }

        let now_ms = self.clock.now_ms();
        self.indicator.show(self.controller.status(), now_ms);

        let button = self.button.state(now_ms);
        if matches!(self.controller.phase(), FlightPhase::Recovered) {
            match button {
                ButtonState::PressedAndReleased => self.send_report(),
                ButtonState::LongPressed => {
                    log_info!("long press, erasing the flight log");
                    if self.controller.erase_flight_log() {
                        self.begin();
                    }
                }
                ButtonState::Released | ButtonState::Pressed => {}
            }
        }
        ticked
    }

    fn process_link(&mut self) {
        while let Some(byte) = self.link.read_byte() {
            self.parser.push(byte);
            let Some(message) = self.parser.next_message() else {
                continue;
            };
            match Command::decode(&message) {
                Ok(command) => self.handle_command(command),
                Err(e) => log_warn!("ignoring frame <{}>: {}", message.as_str(), e),
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        log_debug!("command {}", command.code() as u8);
        let in_flight = self.controller.phase().is_in_flight();

        match command {
            Command::ReadStaticParameters => {
                send_static_parameters(self.controller.config(), N, &mut self.link);
            }
            Command::ReadDynamicParameters => {
                send_dynamic_parameters(self.controller.flight_parameters(), &mut self.link);
            }
            Command::ReadFlightReport => self.send_report(),
            Command::SimulatedAltitude(_) => {
                log_debug!("simulated altitude received outside of a request");
            }
            _ if in_flight => {
                log_warn!("command {} refused in flight", command.code() as u8);
            }
            Command::WriteDynamicParameters => {
                self.controller.persist_flight_parameters();
                log_info!("flight parameters persisted");
                send_dynamic_parameters(self.controller.flight_parameters(), &mut self.link);
            }
            Command::RestoreFactoryParameters => {
                self.controller.restore_factory_parameters();
                send_dynamic_parameters(self.controller.flight_parameters(), &mut self.link);
            }
            Command::ClearFlightMemory => {
                if self.controller.erase_flight_log() {
                    log_info!("flight log cleared");
                }
            }
            Command::SetParameter { id, value } => {
                match self.controller.set_flight_parameter(id, value) {
                    Ok(()) => send(&mut self.link, &OutputMessage::Parameter { id, value }),
                    Err(e) => log_warn!("{}", e),
                }
            }
            Command::SetSimulationMode(enabled) => {
                if enabled != self.simulation.is_some() {
                    self.simulation =
                        enabled.then(|| SimulatedAltimeter::new(self.simulation_timeout_ms));
                    log_info!("simulation mode {}", if enabled { "on" } else { "off" });
                    send(&mut self.link, &OutputMessage::SimulationMode(enabled));
                    self.begin();
                } else {
                    send(&mut self.link, &OutputMessage::SimulationMode(enabled));
                }
            }
        }
    }

    fn send_report(&mut self) {
        let params = *self.controller.flight_parameters();
        let delta_t_ms = self.controller.config().delta_t_ms;
        send_flight_report(self.controller.log_mut(), &params, delta_t_ms, &mut self.link);
    }

    pub fn is_simulation(&self) -> bool {
        self.simulation.is_some()
    }

    pub fn controller(&self) -> &FlightController<A, C, S, N> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut FlightController<A, C, S, N> {
        &mut self.controller
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        flight_log::{FlightEvent, FlightLog},
        hal::{RamStorage, SystemStatus},
        params::{ParameterId, StaticParameters},
        tests::{
            ClockDelay, ManualClock, MemoryLink, RecordingIndicator, RecordingIo, ScriptedSensor,
            SharedButton, init_logger,
        },
    };

    const WINDOW: usize = 16;

    type TestSystem = RecoverySystem<
        RecordingIo,
        ManualClock,
        RamStorage<1024>,
        ScriptedSensor,
        MemoryLink,
        ClockDelay,
        RecordingIndicator,
        SharedButton,
        WINDOW,
    >;

    fn system(
        storage: RamStorage<1024>,
        profile: impl Fn(u64) -> f32 + 'static,
    ) -> (TestSystem, ManualClock, SharedButton) {
        let clock = ManualClock::new(0);
        let button = SharedButton::default();
        let controller = FlightController::new(
            StaticParameters::default(),
            RecordingIo::default(),
            clock.clone(),
            storage,
        );
        let peripherals = Peripherals {
            altimeter: ScriptedSensor::new(clock.clone(), profile),
            link: MemoryLink::default(),
            delay: ClockDelay {
                clock: clock.clone(),
            },
            indicator: RecordingIndicator::default(),
            button: button.clone(),
        };
        (RecoverySystem::new(controller, peripherals), clock, button)
    }

    fn recorded_flight() -> RamStorage<1024> {
        let mut log = FlightLog::new(RamStorage::<1024>::new());
        for altitude in [0.0, 40.0, 80.0, 60.0, 20.0] {
            log.append_altitude(altitude);
        }
        log.write_event(FlightEvent::Liftoff, 1);
        log.write_event(FlightEvent::Drogue, 3);
        log.into_storage()
    }

    #[test]
    fn boot_announces_initialization() {
        init_logger();
        let (mut system, _, _) = system(RamStorage::new(), |_| 0.0);
        system.begin();

        assert_eq!(
            system.link_mut().take_output(),
            "<6>\r\n<4,1.6.2-KF>\r\n<7>\r\n"
        );
        assert_eq!(system.indicator().last(), Some(SystemStatus::ReadyToLaunch));
    }

    #[test]
    fn parameters_are_read_set_and_persisted() {
        init_logger();
        let (mut system, clock, _) = system(RamStorage::new(), |_| 0.0);
        system.begin();
        system.link_mut().take_output();

        system.link_mut().push_str("<8,40>\r\n<13,0>\r\n<2>\r\n");
        clock.advance(100);
        system.run_once();

        let output = system.link_mut().take_output();
        assert!(output.starts_with("<18,40>\r\n<18,40>\r\n"), "{}", output);
        let stored = system
            .controller_mut()
            .log_mut()
            .read_flight_parameters()
            .unwrap();
        assert_eq!(stored.get(ParameterId::SpeedForLiftoffDetection), 40);
        assert_eq!(stored.get(ParameterId::MaxDeploymentAttempts), 3);

        system.link_mut().push_str("<3>");
        system.run_once();
        assert!(system.link_mut().take_output().starts_with("<18,30>"));
    }

    #[test]
    fn static_parameters_include_window_length() {
        init_logger();
        let (mut system, _, _) = system(RamStorage::new(), |_| 0.0);
        system.link_mut().push_str("<0>");
        system.run_once();
        assert_eq!(
            system.link_mut().take_output(),
            "<4,1.6.2-KF>\r\n<14,500>\r\n<15,1000>\r\n<16,16>\r\n<17,100>\r\n"
        );
    }

    #[test]
    fn short_press_sends_report_when_recovered() {
        init_logger();
        let (mut system, clock, button) = system(recorded_flight(), |_| 0.0);
        system.begin();
        assert_eq!(*system.controller().phase(), FlightPhase::Recovered);
        system.link_mut().take_output();

        button.pressed.set(true);
        clock.advance(100);
        system.run_once();
        button.pressed.set(false);
        clock.advance(100);
        system.run_once();

        let output = system.link_mut().take_output();
        assert!(output.starts_with("<8>\r\n"), "{}", output);
        assert!(output.contains("<10,0.1>\r\n<11,0.3>\r\n"));
        assert!(output.ends_with("<25,80.0>\r\n<9>\r\n"));
    }

    #[test]
    fn long_press_erases_and_restarts() {
        init_logger();
        let (mut system, clock, button) = system(recorded_flight(), |_| 0.0);
        system.begin();
        system.link_mut().take_output();

        button.pressed.set(true);
        system.run_once();
        clock.advance(1600);
        system.run_once();
        button.pressed.set(false);

        assert_eq!(*system.controller().phase(), FlightPhase::ReadyToLaunch);
        assert!(!system.controller().log().has_flight());
        assert!(system.link_mut().take_output().contains("<6>\r\n"));
    }

    #[test]
    fn clear_memory_from_the_ground() {
        init_logger();
        let (mut system, _, _) = system(recorded_flight(), |_| 0.0);
        system.begin();
        system.link_mut().push_str("<4>");
        system.run_once();
        assert_eq!(*system.controller().phase(), FlightPhase::ReadyToLaunch);
        assert!(!system.controller().log().has_flight());
    }

    #[test]
    fn simulation_mode_runs_on_ground_altitudes() {
        init_logger();
        let (mut system, clock, _) = system(RamStorage::new(), |_| 500.0);
        system.begin();
        system.link_mut().take_output();

        system.link_mut().answer_altitude = Some(12.5);
        system.link_mut().push_str("<6,1>");
        system.run_once();
        assert!(system.is_simulation());
        let output = system.link_mut().take_output();
        assert!(output.starts_with("<5,1>\r\n<6>\r\n<1,"), "{}", output);
        assert!(output.ends_with("<7>\r\n"));
        assert_eq!(output.matches("<1,").count(), WINDOW + 1);

        clock.advance(100);
        assert!(system.run_once());
        let output = system.link_mut().take_output();
        assert!(output.ends_with("<2,0>\r\n"), "{}", output);
        assert_relative_eq!(system.controller().window().latest(), 12.5);
    }

    #[test]
    fn configuration_changes_are_refused_in_flight() {
        init_logger();
        let (mut system, clock, _) = system(RamStorage::new(), |now_ms| {
            if now_ms < 2000 {
                0.0
            } else {
                (now_ms - 2000) as f32 * 0.1
            }
        });
        system.begin();
        for _ in 0..40 {
            clock.advance(100);
            system.run_once();
        }
        assert_eq!(*system.controller().phase(), FlightPhase::Flying);
        system.link_mut().take_output();

        system.link_mut().push_str("<8,40><4><6,1>");
        system.run_once();
        assert!(!system.is_simulation());
        assert_eq!(system.link_mut().take_output(), "");
        assert_eq!(
            system
                .controller()
                .flight_parameters()
                .get(ParameterId::SpeedForLiftoffDetection),
            30
        );
    }
}
