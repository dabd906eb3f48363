//! Unified error types for the cabinet controller.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! control loop and the runner handle failures uniformly.  All variants
//! are `Copy` and can travel through the FSM context and event channel
//! without allocation.

use core::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned unusable data.
    Sensor(SensorError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// A cycle-terminating fault.
    Fault(Fault),
    /// Cycle parameters could not be resolved.
    Params(ParamError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// The control-loop worker is not accepting commands.
    Disconnected,
    /// The command queue is full.
    QueueFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Fault(e) => write!(f, "fault: {e}"),
            Self::Params(e) => write!(f, "parameters: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Disconnected => write!(f, "controller disconnected"),
            Self::QueueFull => write!(f, "command queue full"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorError {
    /// No complete reply within the read deadline.
    Timeout,
    /// Reply did not match `<LABEL>:<value>`.
    Malformed,
    /// The underlying transport or bus reported an error.
    Io,
    /// Reading is outside the physically plausible range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "read timed out"),
            Self::Malformed => write!(f, "malformed response"),
            Self::Io => write!(f, "I/O error"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActuatorError {
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// GPIO set failed.
    GpioWriteFailed,
    /// Requested value outside the actuator's range.
    InvalidValue,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::InvalidValue => write!(f, "invalid value"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Faults
// ---------------------------------------------------------------------------

/// Faults end the running cycle.  They are latched in a bitmask by the
/// safety supervisor so that several can be tracked at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Fault {
    /// Chamber temperature reached the emergency limit.
    Overheat = 0b0000_0001,
    /// An actuator write failed twice in a row.
    ActuatorWriteFailure = 0b0000_0010,
}

impl Fault {
    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overheat => write!(f, "overheat"),
            Self::ActuatorWriteFailure => write!(f, "actuator write failure"),
        }
    }
}

impl From<Fault> for Error {
    fn from(e: Fault) -> Self {
        Self::Fault(e)
    }
}

// ---------------------------------------------------------------------------
// Parameter errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// Custom heat step outside 1..=5.
    HeatStepOutOfRange(u8),
    /// Custom session length outside 1..=90 minutes.
    SessionMinutesOutOfRange(u16),
    /// Custom mode was requested without custom settings.
    MissingCustomSettings,
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeatStepOutOfRange(s) => write!(f, "heat step {s} not in 1..=5"),
            Self::SessionMinutesOutOfRange(m) => write!(f, "session of {m} min not in 1..=90"),
            Self::MissingCustomSettings => write!(f, "custom mode needs custom settings"),
        }
    }
}

impl From<ParamError> for Error {
    fn from(e: ParamError) -> Self {
        Self::Params(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
