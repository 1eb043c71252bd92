//! Persistent flight record.
//!
//! Layout of the storage region, little endian, no padding:
//!
//! | offset        | size | content                                   |
//! |---------------|------|-------------------------------------------|
//! | 0             | 14   | [`FlightParameters`]                      |
//! | 14            | 2    | [`ErrorFlags`]                            |
//! | 16            | 8    | liftoff, drogue, parachute, landed ticks  |
//! | 24            | 2·n  | altitude slots, `n = (size - 24) / 2 - 1` |
//! | 24 + 2·n      | 2    | high-water mark                           |

use core::ops::Range;

use packed_struct::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    error_flags::ErrorFlags,
    hal::NonVolatileStorage,
    params::{FlightParameters, ParameterError},
};

mod altitude_codec;
#[cfg(test)]
mod tests;

pub use altitude_codec::{STORED_ALTITUDE_CEILING, decode_altitude, encode_altitude};

const PARAMETERS_ADDRESS: usize = 0;
const ERROR_FLAGS_ADDRESS: usize = FlightParameters::PACKED_LEN;
const EVENTS_ADDRESS: usize = ERROR_FLAGS_ADDRESS + 2;
pub const SLOTS_ADDRESS: usize = EVENTS_ADDRESS + 2 * FlightEvent::ALL.len();

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightEvent {
    Liftoff,
    Drogue,
    Parachute,
    Landed,
}

impl FlightEvent {
    pub const ALL: [FlightEvent; 4] = [
        FlightEvent::Liftoff,
        FlightEvent::Drogue,
        FlightEvent::Parachute,
        FlightEvent::Landed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlightEvent::Liftoff => "liftoff",
            FlightEvent::Drogue => "drogue",
            FlightEvent::Parachute => "parachute",
            FlightEvent::Landed => "landed",
        }
    }

    fn address(&self) -> usize {
        EVENTS_ADDRESS + 2 * (*self as usize)
    }
}

/// One logged sample, `offset_ticks` counted from the first slot.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlightPathSample {
    pub offset_ticks: u32,
    pub altitude: f32,
}

pub struct FlightLog<S: NonVolatileStorage> {
    storage: S,
    capacity: usize,
    high_water_mark: usize,
    full_reported: bool,
}

impl<S: NonVolatileStorage> FlightLog<S> {
    pub fn new(mut storage: S) -> Self {
        let capacity = Self::slot_count(storage.capacity());
        let mut buffer = [0u8; 2];
        storage.read(SLOTS_ADDRESS + 2 * capacity, &mut buffer);
        let mut high_water_mark = u16::from_le_bytes(buffer) as usize;
        if high_water_mark > capacity {
            log_warn!(
                "stored high-water mark {} exceeds capacity {}, clamping",
                high_water_mark,
                capacity
            );
            high_water_mark = capacity;
        }

        Self {
            storage,
            capacity,
            high_water_mark,
            full_reported: false,
        }
    }

    pub const fn slot_count(storage_size: usize) -> usize {
        if storage_size < SLOTS_ADDRESS + 2 {
            0
        } else {
            (storage_size - SLOTS_ADDRESS) / 2 - 1
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index one past the last written slot.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// True when a previous flight left samples behind.
    pub fn has_flight(&self) -> bool {
        self.high_water_mark > 0
    }

    pub fn is_full(&self) -> bool {
        self.high_water_mark >= self.capacity
    }

    /// Writes `altitude` at the high-water mark. Returns false, without
    /// touching the storage, once the log is full.
    pub fn append_altitude(&mut self, altitude: f32) -> bool {
        if self.is_full() {
            if !self.full_reported {
                log_warn!("flight log full after {} samples", self.capacity);
                self.full_reported = true;
            }
            return false;
        }
        let index = self.high_water_mark;
        self.store_altitude(index, altitude);
        self.set_high_water_mark(index + 1);
        true
    }

    /// Overwrites a slot below the capacity, used to fill reserved slots.
    pub fn write_altitude(&mut self, index: usize, altitude: f32) -> bool {
        if index >= self.capacity {
            return false;
        }
        self.store_altitude(index, altitude);
        true
    }

    pub fn read_altitude(&mut self, index: usize) -> Option<f32> {
        if index >= self.high_water_mark {
            return None;
        }
        Some(decode_altitude(self.read_u16(Self::slot_address(index))))
    }

    /// Moves the high-water mark past `count` slots that will be filled later
    /// with [`Self::write_altitude`]. The range is shorter than `count` when
    /// the log runs out of space.
    pub fn reserve_slots(&mut self, count: usize) -> Range<usize> {
        let start = self.high_water_mark;
        let end = (start + count).min(self.capacity);
        if end - start < count {
            log_warn!(
                "flight log can only reserve {} of {} slots",
                end - start,
                count
            );
        }
        self.set_high_water_mark(end);
        start..end
    }

    /// Highest altitude among the written slots.
    pub fn apogee(&mut self) -> Option<f32> {
        let mut apogee: Option<f32> = None;
        for i in 0..self.high_water_mark {
            let altitude = decode_altitude(self.read_u16(Self::slot_address(i)));
            apogee = Some(apogee.map_or(altitude, |max| max.max(altitude)));
        }
        apogee
    }

    /// Records `event` at `offset_ticks` from the first slot. Events are write
    /// once per flight, returns false if `event` was already recorded.
    pub fn write_event(&mut self, event: FlightEvent, offset_ticks: u16) -> bool {
        if self.read_event(event).is_some() {
            log_warn!("{} event already recorded", event.name());
            return false;
        }
        // zero marks an unrecorded event
        self.write_u16(event.address(), offset_ticks.max(1));
        true
    }

    pub fn read_event(&mut self, event: FlightEvent) -> Option<u16> {
        match self.read_u16(event.address()) {
            0 => None,
            offset => Some(offset),
        }
    }

    /// ORs `flags` into the persisted error word.
    pub fn write_error_flags(&mut self, flags: ErrorFlags) {
        let current = self.read_error_flags();
        let updated = current | flags;
        if updated != current {
            self.write_u16(ERROR_FLAGS_ADDRESS, updated.bits());
        }
    }

    pub fn read_error_flags(&mut self) -> ErrorFlags {
        ErrorFlags::from_bits_retain(self.read_u16(ERROR_FLAGS_ADDRESS))
    }

    /// Forgets the recorded flight. Flight parameters are kept.
    pub fn erase(&mut self) {
        self.write_u16(ERROR_FLAGS_ADDRESS, 0);
        for event in FlightEvent::ALL {
            self.write_u16(event.address(), 0);
        }
        self.set_high_water_mark(0);
        self.full_reported = false;
        log_info!("flight log erased");
    }

    /// Stored parameters, rejected if they do not validate (blank memory).
    pub fn read_flight_parameters(&mut self) -> Result<FlightParameters, ParameterError> {
        let mut buffer = [0u8; FlightParameters::PACKED_LEN];
        self.storage.read(PARAMETERS_ADDRESS, &mut buffer);
        // every bit pattern is a valid set of i16
        let params = FlightParameters::unpack(&buffer).unwrap_or_default();
        params.validate()?;
        Ok(params)
    }

    pub fn write_flight_parameters(&mut self, params: &FlightParameters) {
        match params.pack() {
            Ok(bytes) => self.storage.write(PARAMETERS_ADDRESS, &bytes),
            Err(_) => log_error!("failed to pack flight parameters"),
        }
    }

    /// Logged samples with their time offsets.
    ///
    /// Up to the drogue event every tick was logged, afterwards only every
    /// `time_step_scaler`-th tick.
    pub fn flight_path(&mut self, time_step_scaler: u32) -> FlightPath<'_, S> {
        let drogue_slot = self.read_event(FlightEvent::Drogue).map(|d| d as usize);
        FlightPath {
            end: self.high_water_mark,
            log: self,
            index: 0,
            drogue_slot,
            time_step_scaler: time_step_scaler.max(1),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn store_altitude(&mut self, index: usize, altitude: f32) {
        let (stored, flags) = encode_altitude(altitude);
        if !flags.is_empty() {
            log_warn!("altitude {} out of range, stored as {}", altitude, stored);
            self.write_error_flags(flags);
        }
        self.write_u16(Self::slot_address(index), stored);
    }

    fn set_high_water_mark(&mut self, high_water_mark: usize) {
        self.high_water_mark = high_water_mark;
        self.write_u16(Self::slot_address(self.capacity), high_water_mark as u16);
    }

    fn slot_address(index: usize) -> usize {
        SLOTS_ADDRESS + 2 * index
    }

    fn read_u16(&mut self, address: usize) -> u16 {
        let mut buffer = [0u8; 2];
        self.storage.read(address, &mut buffer);
        u16::from_le_bytes(buffer)
    }

    fn write_u16(&mut self, address: usize, value: u16) {
        self.storage.write(address, &value.to_le_bytes());
    }
}

pub struct FlightPath<'a, S: NonVolatileStorage> {
    log: &'a mut FlightLog<S>,
    index: usize,
    end: usize,
    drogue_slot: Option<usize>,
    time_step_scaler: u32,
}

impl<S: NonVolatileStorage> Iterator for FlightPath<'_, S> {
    type Item = FlightPathSample;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }
        let index = self.index;
        self.index += 1;

        let offset_ticks = match self.drogue_slot {
            Some(drogue) if index > drogue => {
                drogue as u32 + (index - drogue) as u32 * self.time_step_scaler
            }
            _ => index as u32,
        };
        Some(FlightPathSample {
            offset_ticks,
            altitude: self.log.read_altitude(index)?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.index;
        (remaining, Some(remaining))
    }
}
