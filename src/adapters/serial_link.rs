//! Request/response link to the sensor microcontroller.
//!
//! One request in flight at a time: drain stale bytes, write the bare
//! command, then collect bytes until `\n` or the deadline.  Everything
//! after the newline in the same read is discarded.
//!
//! Each read waits at most `timeout`, and never past a shared deadline
//! set with [`SerialSensorLink::set_read_deadline`].

use std::thread;
use std::time::{Duration, Instant};

use heapless::Vec;
use log::{debug, warn};

use super::transport::Transport;
use crate::app::ports::SensorPort;
use crate::error::SensorError;
use crate::sensors::protocol::{
    MAX_REPLY_LEN, TEMP_LABEL, TEMP_REQUEST, WEIGHT_LABEL, WEIGHT_REQUEST, parse_reply,
};
use crate::sensors::{TemperatureSource, WeightSource};

/// Pause between empty non-blocking reads.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct SerialSensorLink<T> {
    transport: T,
    timeout: Duration,
    read_deadline: Option<Instant>,
}

impl<T: Transport> SerialSensorLink<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            read_deadline: None,
        }
    }

    /// Cap every following request at `deadline` until cleared.
    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    fn deadline(&self) -> Result<Instant, SensorError> {
        let now = Instant::now();
        let own = now + self.timeout;
        match self.read_deadline {
            Some(shared) if shared <= now => Err(SensorError::Timeout),
            Some(shared) => Ok(own.min(shared)),
            None => Ok(own),
        }
    }

    /// Send `request` and parse the `<label>:<value>` reply.
    pub fn query(&mut self, request: &[u8], label: &str) -> Result<f32, SensorError> {
        let deadline = self.deadline()?;
        self.drain();
        self.write_all(request, deadline)?;

        let mut line: Vec<u8, MAX_REPLY_LEN> = Vec::new();
        let mut buf = [0u8; 32];
        loop {
            let n = self.transport.read(&mut buf).map_err(|e| {
                warn!("Serial read failed: {e:?}");
                SensorError::Io
            })?;
            for &byte in &buf[..n] {
                if byte == b'\n' {
                    let text = core::str::from_utf8(&line).map_err(|_| SensorError::Malformed)?;
                    debug!("Serial reply: {text:?}");
                    return parse_reply(text, label)
                        .inspect_err(|_| warn!("Unexpected response: {text:?}"));
                }
                line.push(byte).map_err(|_| SensorError::Malformed)?;
            }
            if n == 0 {
                if Instant::now() >= deadline {
                    return Err(SensorError::Timeout);
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    fn write_all(&mut self, mut data: &[u8], deadline: Instant) -> Result<(), SensorError> {
        while !data.is_empty() {
            let n = self.transport.write(data).map_err(|e| {
                warn!("Serial write failed: {e:?}");
                SensorError::Io
            })?;
            data = &data[n..];
            if n == 0 {
                if Instant::now() >= deadline {
                    return Err(SensorError::Timeout);
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
        self.transport.flush().map_err(|_| SensorError::Io)
    }

    /// Discard a late reply to an earlier request.
    fn drain(&mut self) {
        let mut buf = [0u8; 32];
        while let Ok(n) = self.transport.read(&mut buf) {
            if n == 0 {
                break;
            }
            debug!("Discarded {n} stale serial bytes");
        }
    }
}

impl<T: Transport> TemperatureSource for SerialSensorLink<T> {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.query(TEMP_REQUEST, TEMP_LABEL)
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        SerialSensorLink::set_read_deadline(self, deadline);
    }
}

impl<T: Transport> WeightSource for SerialSensorLink<T> {
    fn read_kg(&mut self) -> Result<f32, SensorError> {
        self.query(WEIGHT_REQUEST, WEIGHT_LABEL)
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        SerialSensorLink::set_read_deadline(self, deadline);
    }
}

impl<T: Transport> SensorPort for SerialSensorLink<T> {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.read_celsius()
    }

    fn read_weight(&mut self) -> Result<f32, SensorError> {
        self.read_kg()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        SerialSensorLink::set_read_deadline(self, deadline);
    }
}
