//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Owns the sensor link and all actuator drivers, exposing them through
//! [`SensorPort`] and [`ActuatorPort`].  This is the only module in the
//! system that touches actual hardware.  Pins are any `embedded-hal`
//! implementation; [`open_default`] wires up the cabinet's sysfs lines,
//! the sensor UART and optionally the SPI thermocouple.

use std::time::Instant;

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;

use crate::app::ports::{ActuatorPort, SensorPort};
use crate::drivers::fan::FanDriver;
use crate::drivers::relay::RelayDriver;
use crate::error::{ActuatorError, SensorError};

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareController<S, H, D, F> {
    sensors: S,
    heater: RelayDriver<H>,
    door: RelayDriver<D>,
    fan: FanDriver<F>,
}

impl<S, H, D, F> HardwareController<S, H, D, F>
where
    S: SensorPort,
    H: OutputPin,
    D: OutputPin,
    F: SetDutyCycle,
{
    pub fn new(sensors: S, heater: RelayDriver<H>, door: RelayDriver<D>, fan: FanDriver<F>) -> Self {
        Self {
            sensors,
            heater,
            door,
            fan,
        }
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<S, H, D, F> SensorPort for HardwareController<S, H, D, F>
where
    S: SensorPort,
{
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.sensors.read_temperature()
    }

    fn read_weight(&mut self) -> Result<f32, SensorError> {
        self.sensors.read_weight()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        self.sensors.set_read_deadline(deadline);
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<S, H, D, F> ActuatorPort for HardwareController<S, H, D, F>
where
    H: OutputPin,
    D: OutputPin,
    F: SetDutyCycle,
{
    fn set_heater(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.heater.set(on)
    }

    fn set_door_locked(&mut self, locked: bool) -> Result<(), ActuatorError> {
        self.door.set(locked)
    }

    fn set_fan_duty(&mut self, percent: u8) -> Result<(), ActuatorError> {
        self.fan.set_percent(percent)
    }
}

pub use deploy::{DeployedHardware, DeployedSensors, open_default};

mod deploy {
    use std::time::{Duration, Instant};

    use anyhow::Context;

    use super::HardwareController;
    use crate::adapters::serial_link::SerialSensorLink;
    use crate::adapters::transport::UartTransport;
    use crate::app::ports::SensorPort;
    use crate::config::CabinetConfig;
    use crate::drivers::fan::FanDriver;
    use crate::drivers::relay::RelayDriver;
    use crate::drivers::spidev::Spidev;
    use crate::drivers::sysfs::{SysfsGpio, SysfsPwm};
    use crate::error::SensorError;
    use crate::pins;
    use crate::sensors::SplitSensors;
    use crate::sensors::thermocouple::Max6675;

    /// Where the chamber temperature comes from.
    pub enum DeployedSensors {
        /// Both readings from the sensor MCU.
        Serial(SerialSensorLink<UartTransport>),
        /// MAX6675 on the SPI bus, weight still from the MCU.
        Thermocouple(SplitSensors<Max6675<Spidev>, SerialSensorLink<UartTransport>>),
    }

    impl SensorPort for DeployedSensors {
        fn read_temperature(&mut self) -> Result<f32, SensorError> {
            match self {
                Self::Serial(link) => link.read_temperature(),
                Self::Thermocouple(split) => split.read_temperature(),
            }
        }

        fn read_weight(&mut self) -> Result<f32, SensorError> {
            match self {
                Self::Serial(link) => link.read_weight(),
                Self::Thermocouple(split) => split.read_weight(),
            }
        }

        fn set_read_deadline(&mut self, deadline: Option<Instant>) {
            match self {
                Self::Serial(link) => SensorPort::set_read_deadline(link, deadline),
                Self::Thermocouple(split) => split.set_read_deadline(deadline),
            }
        }
    }

    /// The cabinet as deployed: UART sensors, sysfs relays and fan.
    pub type DeployedHardware = HardwareController<DeployedSensors, SysfsGpio, SysfsGpio, SysfsPwm>;

    /// Open every peripheral listed in [`pins`].  With `spi_thermocouple`
    /// the temperature is read from the MAX6675 instead of the MCU.
    pub fn open_default(config: &CabinetConfig, spi_thermocouple: bool) -> anyhow::Result<DeployedHardware> {
        let transport = UartTransport::open(pins::SENSOR_SERIAL_PORT, pins::SENSOR_SERIAL_BAUD)
            .with_context(|| format!("opening {}", pins::SENSOR_SERIAL_PORT))?;
        let link = SerialSensorLink::new(
            transport,
            Duration::from_millis(u64::from(config.sensor_timeout_ms)),
        );
        let sensors = if spi_thermocouple {
            let spi = Spidev::open(pins::THERMOCOUPLE_SPIDEV)
                .with_context(|| format!("opening {}", pins::THERMOCOUPLE_SPIDEV))?;
            DeployedSensors::Thermocouple(SplitSensors {
                temperature: Max6675::new(spi),
                weight: link,
            })
        } else {
            DeployedSensors::Serial(link)
        };
        let heater = SysfsGpio::export(pins::HEATER_RELAY_GPIO)
            .context("exporting heater relay GPIO")?;
        let door = SysfsGpio::export(pins::DOOR_LOCK_RELAY_GPIO)
            .context("exporting door lock relay GPIO")?;
        let fan = SysfsPwm::export(pins::FAN_PWM_CHIP, pins::FAN_PWM_CHANNEL, pins::FAN_PWM_HZ)
            .context("exporting fan PWM")?;

        Ok(HardwareController::new(
            sensors,
            RelayDriver::new(heater, pins::RELAYS_ACTIVE_HIGH, "heater"),
            RelayDriver::new(door, pins::RELAYS_ACTIVE_HIGH, "door lock"),
            FanDriver::new(fan),
        ))
    }
}
