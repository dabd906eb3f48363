//! Sensor subsystem: reply parsing, the MAX6675 decoder and the
//! polling [`SensorHub`].
//!
//! The hub sits between the service and a [`SensorPort`]: it retries a
//! failed read once, rejects implausible values, remembers the last good
//! reading with its age, and turns every poll into a
//! [`Sample`](crate::fsm::context::Sample) for `FsmContext.sensors`.

pub mod protocol;
pub mod thermocouple;

use std::time::Instant;

use log::warn;

use crate::app::ports::SensorPort;
use crate::config::CabinetConfig;
use crate::error::SensorError;
use crate::fsm::context::Sample;

/// Coldest plausible chamber reading (°C).
const MIN_TEMP_C: f32 = -40.0;
/// The MAX6675 tops out at 1023.75 °C.  Hotter readings are clamped here
/// and still reach the overheat interlock.
const MAX_TEMP_C: f32 = 1024.0;
/// Largest weight the load cell can report (kg).
const MAX_WEIGHT_KG: f32 = 500.0;
/// Small negative readings are load-cell drift and clamp to zero.
const NEGATIVE_DRIFT_KG: f32 = -5.0;

// ---------------------------------------------------------------------------
// Source traits
// ---------------------------------------------------------------------------

/// Something that can produce a chamber temperature.
pub trait TemperatureSource {
    fn read_celsius(&mut self) -> Result<f32, SensorError>;

    /// See [`SensorPort::set_read_deadline`].
    fn set_read_deadline(&mut self, _deadline: Option<Instant>) {}
}

/// Something that can produce a load-cell weight.
pub trait WeightSource {
    fn read_kg(&mut self) -> Result<f32, SensorError>;

    /// See [`SensorPort::set_read_deadline`].
    fn set_read_deadline(&mut self, _deadline: Option<Instant>) {}
}

/// Combines independent temperature and weight sources into one
/// [`SensorPort`], e.g. a MAX6675 on SPI with the weight on serial.
pub struct SplitSensors<T, W> {
    pub temperature: T,
    pub weight: W,
}

impl<T: TemperatureSource, W: WeightSource> SensorPort for SplitSensors<T, W> {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.temperature.read_celsius()
    }

    fn read_weight(&mut self) -> Result<f32, SensorError> {
        self.weight.read_kg()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        TemperatureSource::set_read_deadline(&mut self.temperature, deadline);
        WeightSource::set_read_deadline(&mut self.weight, deadline);
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// A remembered good reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub value: f32,
    /// Ticks since the reading was taken.
    pub age_secs: u64,
}

impl SensorReading {
    /// Whether the reading is recent enough to display.
    pub fn is_fresh(&self, freshness_secs: u64) -> bool {
        self.age_secs <= freshness_secs
    }
}

#[derive(Debug, Clone, Copy)]
struct Stamped {
    value: f32,
    tick: u64,
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Polls a [`SensorPort`] on behalf of the control loop.
pub struct SensorHub {
    last_temperature: Option<Stamped>,
    last_weight: Option<Stamped>,
    freshness_secs: u64,
}

impl SensorHub {
    pub fn new(config: &CabinetConfig) -> Self {
        Self {
            last_temperature: None,
            last_weight: None,
            freshness_secs: u64::from(config.sensor_freshness_secs),
        }
    }

    /// Read the temperature, retrying once on failure.
    pub fn poll_temperature(&mut self, port: &mut impl SensorPort, now: u64) -> Sample {
        let result = read_with_retry("temperature", || {
            port.read_temperature().and_then(check_temperature)
        });
        Self::record(&mut self.last_temperature, result, now)
    }

    /// Read the weight, retrying once on failure.
    pub fn poll_weight(&mut self, port: &mut impl SensorPort, now: u64) -> Sample {
        let result = read_with_retry("weight", || port.read_weight().and_then(check_weight));
        Self::record(&mut self.last_weight, result, now)
    }

    /// Last good temperature and its age at `now`.
    pub fn last_temperature(&self, now: u64) -> Option<SensorReading> {
        Self::reading(self.last_temperature, now)
    }

    /// Last good weight and its age at `now`.
    pub fn last_weight(&self, now: u64) -> Option<SensorReading> {
        Self::reading(self.last_weight, now)
    }

    /// Last temperature only if it is still fresh.
    pub fn fresh_temperature(&self, now: u64) -> Option<f32> {
        self.last_temperature(now)
            .filter(|r| r.is_fresh(self.freshness_secs))
            .map(|r| r.value)
    }

    fn record(slot: &mut Option<Stamped>, result: Result<f32, SensorError>, now: u64) -> Sample {
        match result {
            Ok(value) => {
                *slot = Some(Stamped { value, tick: now });
                Sample::Fresh(value)
            }
            Err(_) => Sample::Unknown,
        }
    }

    fn reading(slot: Option<Stamped>, now: u64) -> Option<SensorReading> {
        slot.map(|s| SensorReading {
            value: s.value,
            age_secs: now.saturating_sub(s.tick),
        })
    }
}

fn read_with_retry(
    what: &str,
    mut read: impl FnMut() -> Result<f32, SensorError>,
) -> Result<f32, SensorError> {
    match read() {
        Ok(v) => Ok(v),
        Err(first) => {
            warn!("{what} read failed ({first}), retrying");
            read().inspect_err(|second| warn!("{what} unavailable this tick: {second}"))
        }
    }
}

fn check_temperature(celsius: f32) -> Result<f32, SensorError> {
    if !celsius.is_finite() || celsius < MIN_TEMP_C {
        return Err(SensorError::OutOfRange);
    }
    if celsius > MAX_TEMP_C {
        warn!("temperature {celsius:.1}°C beyond sensor range, clamped");
    }
    Ok(celsius.min(MAX_TEMP_C))
}

fn check_weight(kg: f32) -> Result<f32, SensorError> {
    if !kg.is_finite() || !(NEGATIVE_DRIFT_KG..=MAX_WEIGHT_KG).contains(&kg) {
        return Err(SensorError::OutOfRange);
    }
    Ok(kg.max(0.0))
}
