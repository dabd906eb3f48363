//! Pin and bus assignments for the cabinet's single-board computer.
//!
//! Single source of truth. Every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.
//! GPIO numbers are BCM numbering.

// ---------------------------------------------------------------------------
// Relays
// ---------------------------------------------------------------------------

/// Heater relay coil.
pub const HEATER_RELAY_GPIO: u32 = 4;
/// Door solenoid lock relay coil.
pub const DOOR_LOCK_RELAY_GPIO: u32 = 17;
/// The relay board energises on a HIGH level.
pub const RELAYS_ACTIVE_HIGH: bool = true;

// ---------------------------------------------------------------------------
// Fan (hardware PWM0 on GPIO 18)
// ---------------------------------------------------------------------------

pub const FAN_PWM_CHIP: u32 = 0;
pub const FAN_PWM_CHANNEL: u32 = 0;
/// PWM carrier frequency for the fan.
pub const FAN_PWM_HZ: u32 = 1_000;

// ---------------------------------------------------------------------------
// Sensor MCU (thermocouple + load cell) on the primary UART
// ---------------------------------------------------------------------------

pub const SENSOR_SERIAL_PORT: &str = "/dev/ttyS0";
/// Line speed, 8N1.
pub const SENSOR_SERIAL_BAUD: u32 = 9600;

// ---------------------------------------------------------------------------
// Optional MAX6675 thermocouple on SPI0, CE0
// ---------------------------------------------------------------------------

pub const THERMOCOUPLE_SPIDEV: &str = "/dev/spidev0.0";
