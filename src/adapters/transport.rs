//! Transport abstraction: any byte-oriented channel to the sensor MCU.
//!
//! [`UartTransport`] drives the board's UART through the `serialport`
//! crate.  The serial sensor link is generic over `Transport`, so tests
//! drive it with a scripted in-memory implementation.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::info;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read, or 0 if nothing arrived
    /// within the transport's own short wait.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// How long one `read` may block waiting for the first byte.
const UART_READ_WAIT: Duration = Duration::from_millis(10);

/// The sensor UART, configured 8N1 without flow control.
pub struct UartTransport {
    port: Box<dyn SerialPort>,
}

impl UartTransport {
    pub fn open(path: &str, baud: u32) -> serialport::Result<Self> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(UART_READ_WAIT)
            .open()?;
        info!("Serial link opened on {path} at {baud} 8N1");
        Ok(Self { port })
    }
}

impl Transport for UartTransport {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            other => other,
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.port.write(data) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            other => other,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
