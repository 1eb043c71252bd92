use heapless::Deque;

use crate::{
    hal::{AltitudeSensor, Clock, SerialLink},
    protocol::{Command, MessageParser, OutputMessage},
    report::send,
};

pub const DEFAULT_SIMULATION_TIMEOUT_MS: u64 = 1000;
const DEFERRED_COMMANDS: usize = 4;

/// Altimeter fed by the ground station, used for hardware in the loop runs.
///
/// Every reading sends `<1,time_ms>` and blocks until the matching
/// `<7,altitude>` arrives or the timeout expires, in which case the previous
/// altitude is repeated. Other commands received while waiting are kept for
/// the caller.
#[derive(Debug)]
pub struct SimulatedAltimeter {
    timeout_ms: u64,
    baseline: f32,
    peak: f32,
    last_altitude: f32,
    timeouts: u32,
    deferred: Deque<Command, DEFERRED_COMMANDS>,
}

impl SimulatedAltimeter {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            baseline: 0.0,
            peak: f32::MIN,
            last_altitude: 0.0,
            timeouts: 0,
            deferred: Deque::new(),
        }
    }

    /// Borrows the link for the duration of one controller call.
    pub fn bind<'a, L: SerialLink, C: Clock>(
        &'a mut self,
        link: &'a mut L,
        parser: &'a mut MessageParser,
        clock: &'a C,
    ) -> LinkAltimeter<'a, L, C> {
        LinkAltimeter {
            state: self,
            link,
            parser,
            clock,
        }
    }

    /// Commands that arrived while waiting for an altitude.
    pub fn take_deferred(&mut self) -> Option<Command> {
        self.deferred.pop_front()
    }

    /// Number of requests that went unanswered.
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Starts over from a zero baseline, as a freshly powered altimeter.
    pub fn reset(&mut self) {
        self.baseline = 0.0;
        self.peak = f32::MIN;
        self.last_altitude = 0.0;
    }
}

impl Default for SimulatedAltimeter {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATION_TIMEOUT_MS)
    }
}

pub struct LinkAltimeter<'a, L: SerialLink, C: Clock> {
    state: &'a mut SimulatedAltimeter,
    link: &'a mut L,
    parser: &'a mut MessageParser,
    clock: &'a C,
}

impl<L: SerialLink, C: Clock> LinkAltimeter<'_, L, C> {
    fn request_altitude(&mut self) -> Option<f32> {
        let requested_at = self.clock.now_ms();
        send(
            self.link,
            &OutputMessage::RequestSimulatedAltitude {
                time_ms: requested_at,
            },
        );

        loop {
            while let Some(byte) = self.link.read_byte() {
                self.parser.push(byte);
                let Some(message) = self.parser.next_message() else {
                    continue;
                };
                match Command::decode(&message) {
                    Ok(Command::SimulatedAltitude(altitude)) => return Some(altitude),
                    Ok(command) => {
                        if self.state.deferred.push_back(command).is_err() {
                            log_warn!("command dropped while waiting for a simulated altitude");
                        }
                    }
                    Err(e) => log_warn!("invalid frame while waiting for altitude: {}", e),
                }
            }
            if self.clock.now_ms().saturating_sub(requested_at) >= self.state.timeout_ms {
                return None;
            }
        }
    }
}

impl<L: SerialLink, C: Clock> AltitudeSensor for LinkAltimeter<'_, L, C> {
    fn initialize(&mut self) -> bool {
        true
    }

    fn read_altitude(&mut self) -> f32 {
        let altitude = match self.request_altitude() {
            Some(raw) => raw - self.state.baseline,
            None => {
                self.state.timeouts += 1;
                log_warn!(
                    "no simulated altitude within {} ms, repeating the last one",
                    self.state.timeout_ms
                );
                self.state.last_altitude
            }
        };
        self.state.last_altitude = altitude;
        self.state.peak = self.state.peak.max(altitude);
        altitude
    }

    fn set_baseline(&mut self, offset: f32) {
        self.state.baseline += offset;
        self.state.peak -= offset;
        self.state.last_altitude -= offset;
    }

    fn peak_altitude(&self) -> f32 {
        self.state.peak
    }
}
