use crate::{
    flight_log::{FlightEvent, FlightLog},
    hal::{NonVolatileStorage, SerialLink},
    params::{FlightParameters, ParameterId, StaticParameters},
    protocol::OutputMessage,
};

pub fn send(link: &mut impl SerialLink, message: &OutputMessage) {
    link.write_all(message.to_line().as_bytes());
}

/// Dumps the recorded flight: errors, events, the altitude trace and the
/// apogee, framed by the memory report markers.
///
/// Timestamps after the drogue use the decimation stored with the flight,
/// `fallback` only when the stored parameters are unreadable.
pub fn send_flight_report<S: NonVolatileStorage>(
    log: &mut FlightLog<S>,
    fallback: &FlightParameters,
    delta_t_ms: u32,
    link: &mut impl SerialLink,
) {
    let delta_t_s = delta_t_ms as f32 / 1000.0;
    send(link, &OutputMessage::StartedMemoryReport);

    let errors = log.read_error_flags();
    for error in errors.bit_positions() {
        send(link, &OutputMessage::ErrorLog(error));
    }

    for event in FlightEvent::ALL {
        if let Some(offset) = log.read_event(event) {
            let time_s = offset as f32 * delta_t_s;
            send(link, &OutputMessage::Event { event, time_s });
        }
    }

    let decimation = log
        .read_flight_parameters()
        .map(|stored| stored.log_decimation())
        .unwrap_or_else(|_| fallback.log_decimation());

    let mut samples = 0usize;
    for sample in log.flight_path(decimation) {
        let time_s = sample.offset_ticks as f32 * delta_t_s;
        send(
            link,
            &OutputMessage::FlightPath {
                time_s,
                altitude: sample.altitude,
            },
        );
        samples += 1;
    }

    if let Some(apogee) = log.apogee() {
        send(link, &OutputMessage::Apogee(apogee));
    }
    send(link, &OutputMessage::FinishedMemoryReport);
    log_info!("flight report sent, {} samples", samples);
}

pub fn send_static_parameters(config: &StaticParameters, window_len: usize, link: &mut impl SerialLink) {
    send(link, &OutputMessage::FirmwareVersion(config.firmware_version));
    send(
        link,
        &OutputMessage::ActuatorDischargeTime(config.actuator_discharge_time_ms),
    );
    send(
        link,
        &OutputMessage::CapacitorRechargeTime(config.capacitor_recharge_time_ms),
    );
    send(link, &OutputMessage::WindowLength(window_len as u32));
    send(link, &OutputMessage::DeltaT(config.delta_t_ms));
}

pub fn send_dynamic_parameters(params: &FlightParameters, link: &mut impl SerialLink) {
    for id in ParameterId::ALL {
        send(
            link,
            &OutputMessage::Parameter {
                id,
                value: params.get(id),
            },
        );
    }
}
