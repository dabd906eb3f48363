//! MAX6675 K-type thermocouple converter on SPI.
//!
//! The chip shifts out one 16-bit big-endian word per conversion:
//!
//! ```text
//!  bit 15     dummy sign bit, always 0
//!  bits 14..3 temperature, 0.25 °C per LSB
//!  bit 2      thermocouple input open
//!  bit 1      device ID, always 0
//!  bit 0      three-state
//! ```

use embedded_hal::spi::SpiDevice;

use super::TemperatureSource;
use crate::error::SensorError;

/// Bits that must read zero for a valid conversion.
const INVALID_MASK: u16 = 0x8006;

/// Decode a raw MAX6675 word into °C.
pub fn decode(word: u16) -> Result<f32, SensorError> {
    if word & INVALID_MASK != 0 {
        return Err(SensorError::Malformed);
    }
    Ok(f32::from(word >> 3) / 4.0)
}

/// MAX6675 on an `embedded-hal` SPI device.
pub struct Max6675<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Max6675<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Read and decode one conversion.
    pub fn read(&mut self) -> Result<f32, SensorError> {
        let mut buf = [0u8; 2];
        self.spi.read(&mut buf).map_err(|_| SensorError::Io)?;
        decode(u16::from_be_bytes(buf))
    }

    /// Give the SPI device back.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> TemperatureSource for Max6675<SPI> {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.read()
    }
}
