//! Relay driver for the heater and the door lock.
//!
//! Generic over an `embedded-hal` [`OutputPin`].  Relay boards differ in
//! polarity, so the active level is a constructor argument.  Every call
//! writes the pin, even when the requested state is already applied.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::error::ActuatorError;

pub struct RelayDriver<P> {
    pin: P,
    active_high: bool,
    label: &'static str,
    energised: Option<bool>,
}

impl<P: OutputPin> RelayDriver<P> {
    pub fn new(pin: P, active_high: bool, label: &'static str) -> Self {
        Self {
            pin,
            active_high,
            label,
            energised: None,
        }
    }

    /// Energise (`true`) or release the relay coil.
    pub fn set(&mut self, energise: bool) -> Result<(), ActuatorError> {
        let high = energise == self.active_high;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => {
                self.energised = Some(energise);
                Ok(())
            }
            Err(e) => {
                warn!("{} relay write failed: {e:?}", self.label);
                self.energised = None;
                Err(ActuatorError::GpioWriteFailed)
            }
        }
    }

    /// Last state written successfully; `None` before the first write or
    /// after a failed one.
    pub fn energised(&self) -> Option<bool> {
        self.energised
    }
}
