use libm::roundf;

use crate::error_flags::ErrorFlags;

/// Stored values above this wrap around.
pub const STORED_ALTITUDE_CEILING: i64 = 65000;
const ALTITUDE_OFFSET_M: f32 = 500.0;
const STEPS_PER_M: f32 = 10.0;

/// Encodes an altitude as a 0.1 m fixed point value offset by 500 m.
///
/// Out of range altitudes are folded back into range and reported through
/// the returned flags: negative values are mirrored, values above the ceiling
/// are taken modulo the ceiling.
pub fn encode_altitude(altitude_m: f32) -> (u16, ErrorFlags) {
    let mut flags = ErrorFlags::empty();
    // float to int casts saturate, NaN becomes 0
    let mut raw = roundf((altitude_m + ALTITUDE_OFFSET_M) * STEPS_PER_M) as i64;
    if raw < 0 {
        raw = -raw;
        flags |= ErrorFlags::ALTITUDE_NEGATIVE_OVERFLOW;
    }
    if raw > STORED_ALTITUDE_CEILING {
        raw %= STORED_ALTITUDE_CEILING;
        flags |= ErrorFlags::ALTITUDE_POSITIVE_OVERFLOW;
    }
    (raw as u16, flags)
}

pub fn decode_altitude(stored: u16) -> f32 {
    stored as f32 / STEPS_PER_M - ALTITUDE_OFFSET_M
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn round_trip_within_half_a_step() {
        let mut altitude = -500.0f32;
        while altitude < 6000.0 {
            let (stored, flags) = encode_altitude(altitude);
            assert!(flags.is_empty(), "{} flagged", altitude);
            assert_relative_eq!(decode_altitude(stored), altitude, epsilon = 0.05);
            altitude += 0.37;
        }
    }

    #[test]
    fn known_values() {
        assert_eq!(encode_altitude(0.0), (5000, ErrorFlags::empty()));
        assert_eq!(encode_altitude(-500.0), (0, ErrorFlags::empty()));
        assert_eq!(encode_altitude(123.44), (6234, ErrorFlags::empty()));
        assert_relative_eq!(decode_altitude(6234), 123.4, epsilon = 1e-3);
    }

    #[test]
    fn below_range_is_mirrored_and_flagged() {
        let (stored, flags) = encode_altitude(-510.0);
        assert_eq!(stored, 100);
        assert_eq!(flags, ErrorFlags::ALTITUDE_NEGATIVE_OVERFLOW);
    }

    #[test]
    fn above_ceiling_wraps_and_is_flagged() {
        let (stored, flags) = encode_altitude(6000.1);
        assert_eq!(stored, 1);
        assert_eq!(flags, ErrorFlags::ALTITUDE_POSITIVE_OVERFLOW);

        let (stored, flags) = encode_altitude(6000.0);
        assert_eq!(stored, 65000);
        assert!(flags.is_empty());
    }

    #[test]
    fn far_below_range_sets_both_flags() {
        let (stored, flags) = encode_altitude(-7100.0);
        assert_eq!(stored, 1000);
        assert_eq!(
            flags,
            ErrorFlags::ALTITUDE_NEGATIVE_OVERFLOW | ErrorFlags::ALTITUDE_POSITIVE_OVERFLOW
        );
    }
}
