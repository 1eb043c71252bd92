use approx::assert_relative_eq;

use super::*;
use crate::{hal::RamStorage, params::ParameterId, tests::init_logger};

// 24 header bytes, 8 slots, high-water mark word
type SmallStorage = RamStorage<42>;

fn small_log() -> FlightLog<SmallStorage> {
    FlightLog::new(SmallStorage::new())
}

#[test]
fn slot_count_reserves_the_last_word() {
    assert_eq!(FlightLog::<SmallStorage>::slot_count(42), 8);
    assert_eq!(FlightLog::<SmallStorage>::slot_count(1024), 499);
    assert_eq!(FlightLog::<SmallStorage>::slot_count(10), 0);
    assert_eq!(small_log().capacity(), 8);
}

#[test]
fn append_is_monotonic_and_stops_when_full() {
    init_logger();
    let mut log = small_log();
    assert!(!log.has_flight());

    let mut previous = log.high_water_mark();
    for i in 0..8 {
        assert!(log.append_altitude(i as f32 * 10.0));
        assert!(log.high_water_mark() > previous);
        previous = log.high_water_mark();
    }
    assert!(log.is_full());

    let before = *log.storage().bytes();
    for _ in 0..3 {
        assert!(!log.append_altitude(1234.0));
    }
    assert_eq!(log.high_water_mark(), 8);
    assert_eq!(log.storage().bytes(), &before);
    assert_relative_eq!(log.read_altitude(7).unwrap(), 70.0, epsilon = 0.05);
}

#[test]
fn state_survives_reload_from_storage() {
    init_logger();
    let mut log = small_log();
    log.append_altitude(12.3);
    log.append_altitude(45.6);
    log.write_event(FlightEvent::Liftoff, 1);

    let mut reloaded = FlightLog::new(log.into_storage());
    assert!(reloaded.has_flight());
    assert_eq!(reloaded.high_water_mark(), 2);
    assert_relative_eq!(reloaded.read_altitude(1).unwrap(), 45.6, epsilon = 0.05);
    assert_eq!(reloaded.read_event(FlightEvent::Liftoff), Some(1));
    assert_eq!(reloaded.read_altitude(2), None);
}

#[test]
fn corrupt_high_water_mark_is_clamped() {
    init_logger();
    let mut bytes = [0u8; 42];
    bytes[40] = 0xFF;
    bytes[41] = 0xFF;
    let log = FlightLog::new(RamStorage::from_bytes(bytes));
    assert_eq!(log.high_water_mark(), 8);
}

#[test]
fn reserved_slots_are_filled_later() {
    init_logger();
    let mut log = small_log();
    let reserved = log.reserve_slots(3);
    assert_eq!(reserved, 0..3);
    assert!(log.append_altitude(40.0));

    for (value, index) in reserved.enumerate() {
        assert!(log.write_altitude(index, value as f32 * 10.0));
    }
    let trace: Vec<f32> = (0..4).map(|i| log.read_altitude(i).unwrap()).collect();
    for (actual, expected) in trace.iter().zip([0.0, 10.0, 20.0, 40.0]) {
        assert_relative_eq!(*actual, expected, epsilon = 0.05);
    }
    assert!(!log.write_altitude(8, 0.0));
}

#[test]
fn reservation_is_clipped_at_capacity() {
    init_logger();
    let mut log = small_log();
    log.reserve_slots(6);
    assert_eq!(log.reserve_slots(6), 6..8);
    assert!(log.is_full());
}

#[test]
fn apogee_scans_written_slots() {
    init_logger();
    let mut log = small_log();
    assert_eq!(log.apogee(), None);
    for altitude in [0.0, 150.0, 301.2, 250.0, 10.0] {
        log.append_altitude(altitude);
    }
    assert_relative_eq!(log.apogee().unwrap(), 301.2, epsilon = 0.05);
}

#[test]
fn events_are_write_once() {
    init_logger();
    let mut log = small_log();
    assert_eq!(log.read_event(FlightEvent::Drogue), None);
    assert!(log.write_event(FlightEvent::Drogue, 57));
    assert!(!log.write_event(FlightEvent::Drogue, 80));
    assert_eq!(log.read_event(FlightEvent::Drogue), Some(57));
    assert_eq!(log.read_event(FlightEvent::Parachute), None);
}

#[test]
fn error_flags_accumulate_until_erase() {
    init_logger();
    let mut log = small_log();
    log.write_error_flags(ErrorFlags::BAROMETER_INITIALIZATION_FAILURE);
    log.write_error_flags(ErrorFlags::FLIGHT_STARTED_WITH_NON_EMPTY_MEMORY);
    assert_eq!(
        log.read_error_flags(),
        ErrorFlags::BAROMETER_INITIALIZATION_FAILURE
            | ErrorFlags::FLIGHT_STARTED_WITH_NON_EMPTY_MEMORY
    );

    log.erase();
    assert_eq!(log.read_error_flags(), ErrorFlags::empty());
}

#[test]
fn out_of_range_altitude_raises_error_flag() {
    init_logger();
    let mut log = small_log();
    log.append_altitude(7000.0);
    assert_eq!(
        log.read_error_flags(),
        ErrorFlags::ALTITUDE_POSITIVE_OVERFLOW
    );
}

#[test]
fn erase_keeps_parameters() {
    init_logger();
    let mut log = small_log();
    let mut params = FlightParameters::default();
    params
        .set(ParameterId::ParachuteDeploymentAltitude, 150)
        .unwrap();
    log.write_flight_parameters(&params);
    log.append_altitude(100.0);
    log.write_event(FlightEvent::Landed, 90);

    log.erase();
    assert_eq!(log.high_water_mark(), 0);
    assert_eq!(log.read_event(FlightEvent::Landed), None);
    assert_eq!(log.read_flight_parameters(), Ok(params));

    let reloaded = FlightLog::new(log.into_storage());
    assert!(!reloaded.has_flight());
}

#[test]
fn blank_memory_has_no_valid_parameters() {
    let mut log = small_log();
    assert!(log.read_flight_parameters().is_err());
}

#[test]
fn flight_path_accounts_for_decimation_after_drogue() {
    init_logger();
    let mut log = small_log();
    for i in 0..6 {
        log.append_altitude(i as f32);
    }
    log.write_event(FlightEvent::Drogue, 3);

    let offsets: Vec<u32> = log.flight_path(10).map(|s| s.offset_ticks).collect();
    assert_eq!(offsets, vec![0, 1, 2, 3, 13, 23]);
}

#[test]
fn flight_path_without_drogue_is_one_sample_per_tick() {
    init_logger();
    let mut log = small_log();
    for i in 0..3 {
        log.append_altitude(i as f32 * 2.0);
    }
    let path: Vec<FlightPathSample> = log.flight_path(10).collect();
    assert_eq!(path.len(), 3);
    assert_eq!(path[2].offset_ticks, 2);
    assert_relative_eq!(path[2].altitude, 4.0, epsilon = 0.05);
}
