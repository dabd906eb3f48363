//! Linux `/dev/spidevB.C` back-end for half-duplex SPI peripherals.
//!
//! A plain `read(2)` or `write(2)` on a spidev node is one transfer with
//! chip select held for its whole length, which is all a read-only part
//! like the MAX6675 needs.  Each operation in a transaction is therefore
//! its own chip-select frame, and full-duplex transfers are refused.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use embedded_hal::spi::{self, ErrorType, Operation, SpiDevice};
use log::{debug, info};

#[derive(Debug)]
pub enum SpidevError {
    Io(io::Error),
    /// Full-duplex transfers need the `SPI_IOC_MESSAGE` ioctl.
    FullDuplex,
}

impl core::fmt::Display for SpidevError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "spidev I/O failed: {e}"),
            Self::FullDuplex => f.write_str("full-duplex transfer not supported"),
        }
    }
}

impl std::error::Error for SpidevError {}

impl spi::Error for SpidevError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

pub struct Spidev {
    file: File,
}

impl Spidev {
    /// Open a spidev node.  Mode and clock rate keep the kernel defaults
    /// (mode 0), which suit the MAX6675.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        info!("SPI device opened on {}", path.display());
        Ok(Self { file })
    }
}

impl ErrorType for Spidev {
    type Error = SpidevError;
}

impl SpiDevice for Spidev {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), SpidevError> {
        for op in operations {
            match op {
                Operation::Read(buf) => {
                    self.file.read_exact(buf).map_err(SpidevError::Io)?;
                    debug!("spidev read {buf:02x?}");
                }
                Operation::Write(data) => self.file.write_all(data).map_err(SpidevError::Io)?,
                Operation::DelayNs(ns) => thread::sleep(Duration::from_nanos(u64::from(*ns))),
                Operation::Transfer(..) | Operation::TransferInPlace(..) => {
                    return Err(SpidevError::FullDuplex);
                }
            }
        }
        Ok(())
    }
}
