//! PWM fan driver.

use embedded_hal::pwm::SetDutyCycle;
use log::warn;

use crate::error::ActuatorError;

pub struct FanDriver<P> {
    pwm: P,
    duty: u8,
}

impl<P: SetDutyCycle> FanDriver<P> {
    pub fn new(pwm: P) -> Self {
        Self { pwm, duty: 0 }
    }

    /// Set the fan duty in percent (0–100).
    pub fn set_percent(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if percent > 100 {
            return Err(ActuatorError::InvalidValue);
        }
        self.pwm.set_duty_cycle_percent(percent).map_err(|e| {
            warn!("Fan PWM write failed: {e:?}");
            ActuatorError::PwmWriteFailed
        })?;
        self.duty = percent;
        Ok(())
    }

    pub fn current_duty(&self) -> u8 {
        self.duty
    }
}
