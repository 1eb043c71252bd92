use std::{cell::Cell, collections::VecDeque, rc::Rc, vec::Vec};

use embedded_hal::delay::DelayNs;
#[cfg(feature = "log")]
use log::LevelFilter;

use crate::hal::{
    ActuatorIo, AltitudeSensor, ButtonInput, Clock, PyroChannel, SerialLink, StatusIndicator,
    SystemStatus,
};

pub fn init_logger() {
    #[cfg(feature = "log")]
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .filter(Some("recovery_core"), LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

/// Shared, manually advanced clock.
#[derive(Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: Rc::new(Cell::new(now_ms)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}

/// Blocking delay that only moves the manual clock forward.
pub struct ClockDelay {
    pub clock: ManualClock,
}

impl DelayNs for ClockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance((ns / 1_000_000) as u64);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.advance(ms as u64);
    }
}

/// Actuator outputs with their full switching history.
#[derive(Default)]
pub struct RecordingIo {
    pub initialize_failures: usize,
    drogue: bool,
    parachute: bool,
    pub history: Vec<(PyroChannel, bool)>,
}

impl RecordingIo {
    pub fn with_initialize_failures(initialize_failures: usize) -> Self {
        Self {
            initialize_failures,
            ..Default::default()
        }
    }

    pub fn level(&self, channel: PyroChannel) -> bool {
        match channel {
            PyroChannel::Drogue => self.drogue,
            PyroChannel::Parachute => self.parachute,
        }
    }

    pub fn rising_edges(&self, channel: PyroChannel) -> usize {
        self.edges(channel, true)
    }

    pub fn falling_edges(&self, channel: PyroChannel) -> usize {
        self.edges(channel, false)
    }

    fn edges(&self, channel: PyroChannel, rising: bool) -> usize {
        let mut level = false;
        let mut count = 0;
        for (c, high) in &self.history {
            if *c != channel {
                continue;
            }
            if *high != level && *high == rising {
                count += 1;
            }
            level = *high;
        }
        count
    }
}

impl ActuatorIo for RecordingIo {
    fn initialize(&mut self) -> bool {
        if self.initialize_failures > 0 {
            self.initialize_failures -= 1;
            return false;
        }
        true
    }

    fn set_output(&mut self, channel: PyroChannel, high: bool) {
        match channel {
            PyroChannel::Drogue => self.drogue = high,
            PyroChannel::Parachute => self.parachute = high,
        }
        self.history.push((channel, high));
    }
}

/// Altimeter reading a scripted altitude profile at the current clock time.
pub struct ScriptedSensor {
    clock: ManualClock,
    profile: Box<dyn Fn(u64) -> f32>,
    pub initialize_failures: usize,
    baseline: f32,
    peak: f32,
}

impl ScriptedSensor {
    pub fn new(clock: ManualClock, profile: impl Fn(u64) -> f32 + 'static) -> Self {
        Self {
            clock,
            profile: Box::new(profile),
            initialize_failures: 0,
            baseline: 0.0,
            peak: f32::MIN,
        }
    }

    pub fn baseline(&self) -> f32 {
        self.baseline
    }
}

impl AltitudeSensor for ScriptedSensor {
    fn initialize(&mut self) -> bool {
        if self.initialize_failures > 0 {
            self.initialize_failures -= 1;
            return false;
        }
        true
    }

    fn read_altitude(&mut self) -> f32 {
        let altitude = (self.profile)(self.clock.now_ms()) - self.baseline;
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

#[derive(Default)]
pub struct RecordingIndicator {
    pub shown: Vec<SystemStatus>,
}

impl RecordingIndicator {
    pub fn last(&self) -> Option<SystemStatus> {
        self.shown.last().copied()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&mut self, status: SystemStatus, _now_ms: u64) {
        if self.shown.last() != Some(&status) {
            self.shown.push(status);
        }
    }
}

/// Button whose level is set by the test through a shared cell.
#[derive(Clone, Default)]
pub struct SharedButton {
    pub pressed: Rc<Cell<bool>>,
}

impl ButtonInput for SharedButton {
    fn is_pressed(&mut self) -> bool {
        self.pressed.get()
    }
}

/// In-memory serial link; `incoming` is what the board receives.
///
/// With `answer_altitude` set, every altitude request is answered right away
/// as a ground station in simulation mode would.
#[derive(Default)]
pub struct MemoryLink {
    pub incoming: VecDeque<u8>,
    pub outgoing: Vec<u8>,
    pub answer_altitude: Option<f32>,
}

impl MemoryLink {
    pub fn push_str(&mut self, text: &str) {
        self.incoming.extend(text.bytes());
    }

    pub fn take_output(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.outgoing).into_owned();
        self.outgoing.clear();
        text
    }
}

impl SerialLink for MemoryLink {
    fn read_byte(&mut self) -> Option<u8> {
        self.incoming.pop_front()
    }

    fn write_all(&mut self, data: &[u8]) {
        self.outgoing.extend_from_slice(data);
        if let Some(altitude) = self.answer_altitude {
            if data.starts_with(b"<1,") {
                self.push_str(&format!("<7,{}>\r\n", altitude));
            }
        }
    }
}
