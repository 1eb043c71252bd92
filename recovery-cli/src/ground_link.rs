use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    time::{Duration, Instant},
};

use anyhow::{Result, bail};
use log::{debug, info};
use recovery_core::protocol::{Command, MessageParser, RawMessage};
use serialport::{SerialPort, SerialPortType, available_ports};

use crate::config::CliConfig;

/// Ground side of the serial link to the flight computer.
pub struct GroundLink {
    port: Box<dyn SerialPort>,
    parser: MessageParser,
    pending: VecDeque<RawMessage>,
}

impl GroundLink {
    pub fn open(config: &CliConfig, port_override: Option<&str>) -> Result<Self> {
        let port_name = match port_override.or(config.port.as_deref()) {
            Some(port_name) => port_name.to_owned(),
            None => find_board()?,
        };
        info!("Opening serial port: {}", port_name);
        let port = serialport::new(&port_name, config.baud_rate)
            .timeout(Duration::from_millis(10))
            .open()?;

        Ok(Self {
            port,
            parser: MessageParser::new(),
            pending: VecDeque::new(),
        })
    }

    pub fn send(&mut self, command: &Command) -> Result<()> {
        let line = command.to_line();
        debug!("-> {}", line.trim_end());
        self.port.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Next frame from the board, `None` if nothing arrives within `timeout`.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<RawMessage>> {
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 64];
        loop {
            if let Some(message) = self.pending.pop_front() {
                debug!("<- <{}>", message.as_str());
                return Ok(Some(message));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            match self.port.read(&mut buffer) {
                Ok(n) => {
                    // frames are taken out byte by byte, a burst would
                    // otherwise overflow the parser buffer
                    for byte in &buffer[..n] {
                        self.parser.push(*byte);
                        if let Some(message) = self.parser.next_message() {
                            self.pending.push_back(message);
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// The only USB serial port, if there is exactly one.
fn find_board() -> Result<String> {
    let ports = available_ports()?
        .into_iter()
        .filter(|port| matches!(port.port_type, SerialPortType::UsbPort(_)))
        .collect::<Vec<_>>();

    match ports.as_slice() {
        [] => bail!("No board connected"),
        [port] => Ok(port.port_name.clone()),
        _ => {
            let names = ports
                .iter()
                .map(|port| port.port_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            bail!("More than one serial port connected ({}), pick one with --port", names)
        }
    }
}
