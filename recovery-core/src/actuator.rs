use crate::hal::{ActuatorIo, PyroChannel};

/// Timed discharge / recharge / retry cycle of one capacitor driven igniter.
///
/// Firing drains the capacitor, so the line is held high for the discharge
/// time, then low for the recharge time before another attempt can be made.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentActuator {
    channel: PyroChannel,
    discharge_time_ms: u64,
    recharge_time_ms: u64,
    deploy_count: u16,
    last_activation_ms: u64,
}

impl DeploymentActuator {
    pub fn new(channel: PyroChannel, discharge_time_ms: u32, recharge_time_ms: u32) -> Self {
        Self {
            channel,
            discharge_time_ms: discharge_time_ms as u64,
            recharge_time_ms: recharge_time_ms as u64,
            deploy_count: 0,
            last_activation_ms: 0,
        }
    }

    /// Advances the cycle, returns true once the deployment is finished.
    ///
    /// `stop` is only looked at after a full discharge and recharge period,
    /// it decides between finishing and firing again.
    pub fn deploy(&mut self, io: &mut impl ActuatorIo, now_ms: u64, stop: bool) -> bool {
        if self.deploy_count == 0 {
            self.fire(io, now_ms);
            return false;
        }

        let discharged_at = self.last_activation_ms + self.discharge_time_ms;
        if now_ms > discharged_at + self.recharge_time_ms {
            if stop {
                io.set_output(self.channel, false);
                true
            } else {
                self.fire(io, now_ms);
                false
            }
        } else if now_ms > discharged_at {
            io.set_output(self.channel, false);
            false
        } else {
            false
        }
    }

    /// Turns the output off and forgets any previous attempt.
    pub fn reload(&mut self, io: &mut impl ActuatorIo) {
        io.set_output(self.channel, false);
        self.deploy_count = 0;
        self.last_activation_ms = 0;
    }

    fn fire(&mut self, io: &mut impl ActuatorIo, now_ms: u64) {
        io.set_output(self.channel, true);
        self.last_activation_ms = now_ms;
        self.deploy_count += 1;
        log_info!(
            "{} deployment attempt {}",
            self.channel.name(),
            self.deploy_count
        );
    }

    pub fn channel(&self) -> PyroChannel {
        self.channel
    }

    pub fn deploy_count(&self) -> u16 {
        self.deploy_count
    }

    pub fn last_activation_ms(&self) -> u64 {
        self.last_activation_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{RecordingIo, init_logger};

    fn drogue() -> DeploymentActuator {
        DeploymentActuator::new(PyroChannel::Drogue, 500, 1000)
    }

    #[test]
    fn first_call_fires_immediately() {
        init_logger();
        let mut io = RecordingIo::default();
        let mut actuator = drogue();

        assert!(!actuator.deploy(&mut io, 10_000, true));
        assert!(io.level(PyroChannel::Drogue));
        assert_eq!(actuator.deploy_count(), 1);
        assert_eq!(actuator.last_activation_ms(), 10_000);
    }

    #[test]
    fn follows_discharge_then_recharge() {
        init_logger();
        let mut io = RecordingIo::default();
        let mut actuator = drogue();

        actuator.deploy(&mut io, 1000, false);
        assert!(!actuator.deploy(&mut io, 1500, false));
        assert!(io.level(PyroChannel::Drogue), "still discharging at the boundary");

        assert!(!actuator.deploy(&mut io, 1501, false));
        assert!(!io.level(PyroChannel::Drogue));

        assert!(!actuator.deploy(&mut io, 2500, false));
        assert!(!io.level(PyroChannel::Drogue));

        assert!(!actuator.deploy(&mut io, 2501, false));
        assert!(io.level(PyroChannel::Drogue));
        assert_eq!(actuator.deploy_count(), 2);
    }

    #[test]
    fn finishes_low_once_stopped_after_a_full_cycle() {
        init_logger();
        let mut io = RecordingIo::default();
        let mut actuator = drogue();

        actuator.deploy(&mut io, 0, true);
        assert!(!actuator.deploy(&mut io, 1200, true));
        assert!(actuator.deploy(&mut io, 1600, true));
        assert!(!io.level(PyroChannel::Drogue));
        assert_eq!(actuator.deploy_count(), 1);
    }

    #[test]
    fn bounded_by_max_attempts() {
        init_logger();
        let max_attempts = 3;
        let mut io = RecordingIo::default();
        let mut actuator = drogue();

        let mut finished_at = None;
        for tick in 0..200u64 {
            let now_ms = tick * 100;
            let stop = actuator.deploy_count() >= max_attempts;
            if actuator.deploy(&mut io, now_ms, stop) && finished_at.is_none() {
                finished_at = Some(now_ms);
            }
        }

        assert_eq!(io.rising_edges(PyroChannel::Drogue), max_attempts as usize);
        assert_eq!(io.falling_edges(PyroChannel::Drogue), max_attempts as usize);
        assert!(!io.level(PyroChannel::Drogue));
        assert!(finished_at.is_some());
    }

    #[test]
    fn reload_turns_output_off_and_rearms() {
        init_logger();
        let mut io = RecordingIo::default();
        let mut actuator = drogue();

        actuator.deploy(&mut io, 100, false);
        actuator.reload(&mut io);
        assert!(!io.level(PyroChannel::Drogue));
        assert_eq!(actuator.deploy_count(), 0);
        assert_eq!(actuator.last_activation_ms(), 0);

        actuator.deploy(&mut io, 200, false);
        assert!(io.level(PyroChannel::Drogue));
        assert_eq!(io.rising_edges(PyroChannel::Drogue), 2);
    }
}
