use bitflags::bitflags;

bitflags! {
    /// Persistent error log of the flight computer.
    ///
    /// Every error owns one bit so that several of them can be stored in the
    /// same word and told apart later. Error `n` lives in bit `n`, bit 0 is
    /// never used.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ErrorFlags: u16 {
        const BAROMETER_INITIALIZATION_FAILURE = 1 << 1;
        const ACTUATOR_INITIALIZATION_FAILURE = 1 << 2;
        const ALTITUDE_NEGATIVE_OVERFLOW = 1 << 3;
        const ALTITUDE_POSITIVE_OVERFLOW = 1 << 4;
        const FLIGHT_STARTED_WITH_NON_EMPTY_MEMORY = 1 << 5;
    }
}

impl ErrorFlags {
    /// Bit positions of the raised errors, lowest first. This is the error
    /// number shown to the operator.
    pub fn bit_positions(&self) -> impl Iterator<Item = u8> + '_ {
        let bits = self.bits();
        (0..16u8).filter(move |i| bits & (1 << i) != 0)
    }

    pub fn describe(bit_position: u8) -> &'static str {
        match bit_position {
            1 => "barometer initialization failure",
            2 => "actuator initialization failure",
            3 => "altitude negative overflow",
            4 => "altitude positive overflow",
            5 => "flight started with non-empty memory",
            _ => "unknown error",
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ErrorFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "ErrorFlags({=u16:#06x})", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_numbers_match_bit_positions() {
        assert_eq!(ErrorFlags::BAROMETER_INITIALIZATION_FAILURE.bits(), 2);
        assert_eq!(ErrorFlags::FLIGHT_STARTED_WITH_NON_EMPTY_MEMORY.bits(), 32);
    }

    #[test]
    fn decomposes_into_bit_positions() {
        let flags = ErrorFlags::ACTUATOR_INITIALIZATION_FAILURE
            | ErrorFlags::ALTITUDE_POSITIVE_OVERFLOW;
        let positions: Vec<u8> = flags.bit_positions().collect();
        assert_eq!(positions, vec![2, 4]);
        assert_eq!(ErrorFlags::describe(4), "altitude positive overflow");
    }

    #[test]
    fn unknown_bits_survive_a_round_trip() {
        let flags = ErrorFlags::from_bits_retain(0x8001);
        assert_eq!(flags.bits(), 0x8001);
        let positions: Vec<u8> = flags.bit_positions().collect();
        assert_eq!(positions, vec![0, 15]);
    }
}
