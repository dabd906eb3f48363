//! Linux sysfs GPIO and PWM back-ends.
//!
//! The cabinet runs on a single-board computer where the relays and the
//! fan hang off `/sys/class/gpio` and `/sys/class/pwm`.  Both types
//! implement the `embedded-hal` traits so the drivers above stay generic.
//! The sysfs root is a parameter so the back-ends can be exercised
//! against a scratch directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use embedded_hal::{digital, pwm};
use log::{debug, info};

/// Default sysfs mount.
pub const SYSFS_ROOT: &str = "/sys/class";

/// PWM duty resolution exposed through `SetDutyCycle`.
const PWM_STEPS: u16 = 10_000;

/// A sysfs attribute could not be written.
#[derive(Debug)]
pub struct SysfsError(pub io::Error);

impl core::fmt::Display for SysfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sysfs write failed: {}", self.0)
    }
}

impl std::error::Error for SysfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl digital::Error for SysfsError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for SysfsError {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), SysfsError> {
    debug!("sysfs {} <- {value}", path.display());
    fs::write(path, value).map_err(SysfsError)
}

// ───────────────────────────────────────────────────────────────
// GPIO
// ───────────────────────────────────────────────────────────────

/// One exported GPIO line configured as an output.
pub struct SysfsGpio {
    value: PathBuf,
}

impl SysfsGpio {
    /// Export BCM line `pin` under the default root.
    pub fn export(pin: u32) -> Result<Self, SysfsError> {
        Self::export_at(Path::new(SYSFS_ROOT), pin)
    }

    pub fn export_at(root: &Path, pin: u32) -> Result<Self, SysfsError> {
        let gpio = root.join("gpio");
        let line = gpio.join(format!("gpio{pin}"));
        if !line.exists() {
            write_attr(&gpio.join("export"), &pin.to_string())?;
        }
        write_attr(&line.join("direction"), "out")?;
        info!("GPIO{pin} exported as output");
        Ok(Self {
            value: line.join("value"),
        })
    }
}

impl digital::ErrorType for SysfsGpio {
    type Error = SysfsError;
}

impl digital::OutputPin for SysfsGpio {
    fn set_low(&mut self) -> Result<(), SysfsError> {
        write_attr(&self.value, "0")
    }

    fn set_high(&mut self) -> Result<(), SysfsError> {
        write_attr(&self.value, "1")
    }
}

// ───────────────────────────────────────────────────────────────
// PWM
// ───────────────────────────────────────────────────────────────

/// One exported, enabled PWM channel.
pub struct SysfsPwm {
    duty_cycle: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    /// Export `channel` of `pwmchip{chip}` under the default root.
    pub fn export(chip: u32, channel: u32, frequency_hz: u32) -> Result<Self, SysfsError> {
        Self::export_at(Path::new(SYSFS_ROOT), chip, channel, frequency_hz)
    }

    pub fn export_at(
        root: &Path,
        chip: u32,
        channel: u32,
        frequency_hz: u32,
    ) -> Result<Self, SysfsError> {
        let chip_dir = root.join("pwm").join(format!("pwmchip{chip}"));
        let dir = chip_dir.join(format!("pwm{channel}"));
        if !dir.exists() {
            write_attr(&chip_dir.join("export"), &channel.to_string())?;
        }
        let period_ns = 1_000_000_000 / u64::from(frequency_hz.max(1));
        write_attr(&dir.join("period"), &period_ns.to_string())?;
        write_attr(&dir.join("duty_cycle"), "0")?;
        write_attr(&dir.join("enable"), "1")?;
        info!("PWM {chip}/{channel} enabled at {frequency_hz} Hz");
        Ok(Self {
            duty_cycle: dir.join("duty_cycle"),
            period_ns,
        })
    }
}

impl pwm::ErrorType for SysfsPwm {
    type Error = SysfsError;
}

impl pwm::SetDutyCycle for SysfsPwm {
    fn max_duty_cycle(&self) -> u16 {
        PWM_STEPS
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), SysfsError> {
        let duty = u64::from(duty.min(PWM_STEPS));
        let ns = self.period_ns * duty / u64::from(PWM_STEPS);
        write_attr(&self.duty_cycle, &ns.to_string())
    }
}
