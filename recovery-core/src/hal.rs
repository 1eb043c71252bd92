use serde::{Deserialize, Serialize};

/// Monotonic millisecond clock.
pub trait Clock: Clone {
    fn now_ms(&self) -> u64;
}

/// Barometric altimeter, altitudes in meters relative to a movable baseline.
pub trait AltitudeSensor {
    /// Returns true once the sensor answered and is ready to be sampled.
    fn initialize(&mut self) -> bool;

    fn read_altitude(&mut self) -> f32;

    /// Moves the baseline by `offset` meters. Offsets accumulate, so passing
    /// the current relative altitude makes it the new zero.
    fn set_baseline(&mut self, offset: f32);

    /// Highest altitude read since the last baseline change.
    fn peak_altitude(&self) -> f32;
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PyroChannel {
    Drogue,
    Parachute,
}

impl PyroChannel {
    pub fn name(&self) -> &'static str {
        match self {
            PyroChannel::Drogue => "drogue",
            PyroChannel::Parachute => "parachute",
        }
    }
}

/// Igniter outputs of the two recovery channels.
pub trait ActuatorIo {
    fn initialize(&mut self) -> bool;

    fn set_output(&mut self, channel: PyroChannel, high: bool);
}

/// Byte addressable non-volatile memory of fixed size (EEPROM or similar).
///
/// Out of range accesses are the caller's bug; implementations may clip them.
pub trait NonVolatileStorage {
    fn capacity(&self) -> usize;

    fn read(&mut self, address: usize, buffer: &mut [u8]);

    fn write(&mut self, address: usize, data: &[u8]);
}

/// Byte stream to the ground (USB serial on the board).
pub trait SerialLink {
    /// Non-blocking, returns `None` when nothing is buffered.
    fn read_byte(&mut self) -> Option<u8>;

    fn write_all(&mut self, data: &[u8]);
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemStatus {
    Initializing,
    SensorFailure,
    ActuatorFailure,
    ReadyToLaunch,
    Flying,
    Recovered,
}

/// LED / buzzer renderer. Called once per loop iteration with the current status.
pub trait StatusIndicator {
    fn show(&mut self, status: SystemStatus, now_ms: u64);
}

/// Debounced push button level.
pub trait ButtonInput {
    fn is_pressed(&mut self) -> bool;
}

/// Plain RAM backed storage, used by tests and the host simulator.
#[derive(Clone)]
pub struct RamStorage<const SIZE: usize> {
    bytes: [u8; SIZE],
}

impl<const SIZE: usize> RamStorage<SIZE> {
    pub const fn new() -> Self {
        Self { bytes: [0; SIZE] }
    }

    pub fn from_bytes(bytes: [u8; SIZE]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8; SIZE] {
        &self.bytes
    }
}

impl<const SIZE: usize> Default for RamStorage<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> NonVolatileStorage for RamStorage<SIZE> {
    fn capacity(&self) -> usize {
        SIZE
    }

    fn read(&mut self, address: usize, buffer: &mut [u8]) {
        let end = (address + buffer.len()).min(SIZE);
        if address >= end {
            return;
        }
        buffer[..end - address].copy_from_slice(&self.bytes[address..end]);
    }

    fn write(&mut self, address: usize, data: &[u8]) {
        let end = (address + data.len()).min(SIZE);
        if address >= end {
            return;
        }
        self.bytes[address..end].copy_from_slice(&data[..end - address]);
    }
}

impl<T: NonVolatileStorage + ?Sized> NonVolatileStorage for &mut T {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read(&mut self, address: usize, buffer: &mut [u8]) {
        (**self).read(address, buffer)
    }

    fn write(&mut self, address: usize, data: &[u8]) {
        (**self).write(address, data)
    }
}
