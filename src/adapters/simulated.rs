//! Simulated cabinet for development without hardware.
//!
//! [`SimulatedController`] implements both ports against in-memory state
//! and a first-order thermal model of the chamber:
//!
//! ```text
//!   dT/dt = HEATER_RATE·[heater on] − (LOSS + FAN_LOSS·duty) · (T − AMBIENT)
//! ```
//!
//! The model only moves when [`SimHandle::advance`] is called, usually
//! once per tick through [`SimTicker`].  A [`SimHandle`] is a cheap clone
//! that lets another thread place weight in the chamber, force the
//! temperature, or make the next reads and writes fail.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use log::debug;

use crate::app::ports::{ActuatorPort, SensorPort, Ticker};
use crate::error::{ActuatorError, SensorError};

/// Room temperature (°C).
pub const AMBIENT_C: f32 = 25.0;
/// Heating rate with the element on (°C/s).
const HEATER_RATE_C_PER_S: f32 = 1.2;
/// Passive loss coefficient (1/s).
const LOSS_PER_S: f32 = 0.004;
/// Extra loss per percent of fan duty (1/s).
const FAN_LOSS_PER_S: f32 = 0.000_15;

/// `f32` stored as raw bits.
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(v: f32) -> Self {
        Self(AtomicU32::new(v.to_bits()))
    }
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
    fn store(&self, v: f32) {
        self.0.store(v.to_bits(), Ordering::Release);
    }
}

/// Decrement a failure budget; `true` if this call should fail.
fn take_failure(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

struct SimState {
    temperature: AtomicF32,
    weight: AtomicF32,
    heater_on: AtomicBool,
    door_locked: AtomicBool,
    fan_duty: AtomicU8,
    fail_temperature: AtomicU32,
    fail_weight: AtomicU32,
    fail_writes: AtomicU32,
}

/// Shared view of the simulated cabinet.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<SimState>,
}

impl SimHandle {
    /// Step the thermal model by `secs` seconds.
    pub fn advance(&self, secs: f32) {
        let s = &self.state;
        let mut t = s.temperature.load();
        let heat = if s.heater_on.load(Ordering::Acquire) {
            HEATER_RATE_C_PER_S
        } else {
            0.0
        };
        let loss = LOSS_PER_S + FAN_LOSS_PER_S * f32::from(s.fan_duty.load(Ordering::Acquire));
        // One-second sub-steps keep the explicit Euler step stable.
        let mut left = secs.max(0.0);
        while left > 0.0 {
            let dt = left.min(1.0);
            t += (heat - loss * (t - AMBIENT_C)) * dt;
            left -= dt;
        }
        s.temperature.store(t);
    }

    pub fn set_weight(&self, kg: f32) {
        self.state.weight.store(kg);
    }

    pub fn set_temperature(&self, celsius: f32) {
        self.state.temperature.store(celsius);
    }

    /// The next `n` temperature reads fail with `Timeout`.
    pub fn fail_temperature_reads(&self, n: u32) {
        self.state.fail_temperature.store(n, Ordering::Release);
    }

    /// The next `n` weight reads fail with `Timeout`.
    pub fn fail_weight_reads(&self, n: u32) {
        self.state.fail_weight.store(n, Ordering::Release);
    }

    /// The next `n` actuator writes fail.
    pub fn fail_actuator_writes(&self, n: u32) {
        self.state.fail_writes.store(n, Ordering::Release);
    }

    pub fn temperature(&self) -> f32 {
        self.state.temperature.load()
    }

    pub fn weight(&self) -> f32 {
        self.state.weight.load()
    }

    pub fn heater_on(&self) -> bool {
        self.state.heater_on.load(Ordering::Acquire)
    }

    pub fn door_locked(&self) -> bool {
        self.state.door_locked.load(Ordering::Acquire)
    }

    pub fn fan_duty(&self) -> u8 {
        self.state.fan_duty.load(Ordering::Acquire)
    }
}

/// In-memory cabinet implementing both ports.
pub struct SimulatedController {
    handle: SimHandle,
}

impl SimulatedController {
    /// Cold, empty cabinet with every actuator off.
    pub fn new() -> Self {
        let state = SimState {
            temperature: AtomicF32::new(AMBIENT_C),
            weight: AtomicF32::new(0.0),
            heater_on: AtomicBool::new(false),
            door_locked: AtomicBool::new(false),
            fan_duty: AtomicU8::new(0),
            fail_temperature: AtomicU32::new(0),
            fail_weight: AtomicU32::new(0),
            fail_writes: AtomicU32::new(0),
        };
        Self {
            handle: SimHandle {
                state: Arc::new(state),
            },
        }
    }

    pub fn handle(&self) -> SimHandle {
        self.handle.clone()
    }

    fn write_guard(&self, what: &str) -> Result<(), ActuatorError> {
        if take_failure(&self.handle.state.fail_writes) {
            debug!("SIM: injected {what} write failure");
            return Err(ActuatorError::GpioWriteFailed);
        }
        Ok(())
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorPort for SimulatedController {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        if take_failure(&self.handle.state.fail_temperature) {
            return Err(SensorError::Timeout);
        }
        Ok(self.handle.temperature())
    }

    fn read_weight(&mut self) -> Result<f32, SensorError> {
        if take_failure(&self.handle.state.fail_weight) {
            return Err(SensorError::Timeout);
        }
        Ok(self.handle.weight())
    }
}

impl ActuatorPort for SimulatedController {
    fn set_heater(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.write_guard("heater")?;
        self.handle.state.heater_on.store(on, Ordering::Release);
        debug!("SIM: heater {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    fn set_door_locked(&mut self, locked: bool) -> Result<(), ActuatorError> {
        self.write_guard("door")?;
        self.handle.state.door_locked.store(locked, Ordering::Release);
        debug!("SIM: door {}", if locked { "locked" } else { "unlocked" });
        Ok(())
    }

    fn set_fan_duty(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if percent > 100 {
            return Err(ActuatorError::InvalidValue);
        }
        self.write_guard("fan")?;
        self.handle.state.fan_duty.store(percent, Ordering::Release);
        debug!("SIM: fan {percent}%");
        Ok(())
    }
}

/// Wraps a pacing ticker and advances the model one second per tick.
pub struct SimTicker<T> {
    inner: T,
    handle: SimHandle,
}

impl<T: Ticker> SimTicker<T> {
    pub fn new(inner: T, handle: SimHandle) -> Self {
        Self { inner, handle }
    }
}

impl<T: Ticker> Ticker for SimTicker<T> {
    fn wait(&mut self) {
        self.inner.wait();
        self.handle.advance(1.0);
    }
}
