//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (sensors, actuators, event sinks, pacing) implement these
//! traits.  The [`AppService`](super::service::AppService) consumes them via
//! generics, so the domain core never touches hardware directly.
//!
//! All port errors are typed; callers must handle every variant explicitly.

use std::time::Instant;

use crate::error::{ActuatorError, SensorError};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain sensor data.
///
/// Each read returns within the adapter's bounded timeout (at most 2 s).
pub trait SensorPort {
    /// Chamber temperature in °C.
    fn read_temperature(&mut self) -> Result<f32, SensorError>;

    /// Load-cell weight in kg.
    fn read_weight(&mut self) -> Result<f32, SensorError>;

    /// Share one deadline across every read until the next call, retries
    /// included.  `None` restores the per-read timeout.  Adapters whose
    /// reads never block can ignore it.
    fn set_read_deadline(&mut self, _deadline: Option<Instant>) {}
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to command actuators.
///
/// Implementations must be idempotent; writing the current value again
/// is always allowed.
pub trait ActuatorPort {
    /// Energise or release the heater relay.
    fn set_heater(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Engage or release the door lock.
    fn set_door_locked(&mut self, locked: bool) -> Result<(), ActuatorError>;

    /// Set the fan duty (0–100 %).
    fn set_fan_duty(&mut self, percent: u8) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / caller)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (event channel,
/// JSON lines on stdout, the log).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Ticker port (driven adapter: wall clock → domain)
// ───────────────────────────────────────────────────────────────

/// Paces the control loop.  One `wait` is one tick of cycle time.
pub trait Ticker {
    /// Block until the next tick boundary.
    fn wait(&mut self);
}
