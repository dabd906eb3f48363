//! Mock hardware adapter for integration tests.
//!
//! Records every successful actuator write so tests can assert on the full
//! command history without touching real GPIO/PWM.  Sensor values and
//! failures are set directly on the struct.

use bakhoor::app::events::AppEvent;
use bakhoor::app::ports::{ActuatorPort, EventSink, SensorPort};
use bakhoor::error::{ActuatorError, SensorError};
use bakhoor::fsm::StateId;

// ── Actuator call record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCall {
    Heater(bool),
    DoorLocked(bool),
    FanDuty(u8),
}

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    pub calls: Vec<ActuatorCall>,
    pub temperature: Result<f32, SensorError>,
    pub weight: Result<f32, SensorError>,
    pub temperature_reads: u32,
    pub weight_reads: u32,
    /// The next `n` writes fail.
    pub fail_writes: u32,
    pub write_attempts: u32,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            temperature: Ok(25.0),
            weight: Ok(0.0),
            temperature_reads: 0,
            weight_reads: 0,
            fail_writes: 0,
            write_attempts: 0,
        }
    }

    pub fn heater_on(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::Heater(on) => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn door_locked(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::DoorLocked(locked) => Some(*locked),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn fan_duty(&self) -> u8 {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                ActuatorCall::FanDuty(d) => Some(*d),
                _ => None,
            })
            .unwrap_or(0)
    }

    fn write(&mut self, call: ActuatorCall) -> Result<(), ActuatorError> {
        self.write_attempts += 1;
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(ActuatorError::GpioWriteFailed);
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorPort for MockHardware {
    fn set_heater(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.write(ActuatorCall::Heater(on))
    }

    fn set_door_locked(&mut self, locked: bool) -> Result<(), ActuatorError> {
        self.write(ActuatorCall::DoorLocked(locked))
    }

    fn set_fan_duty(&mut self, percent: u8) -> Result<(), ActuatorError> {
        self.write(ActuatorCall::FanDuty(percent))
    }
}

impl SensorPort for MockHardware {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.temperature_reads += 1;
        self.temperature
    }

    fn read_weight(&mut self) -> Result<f32, SensorError> {
        self.weight_reads += 1;
        self.weight
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Keeps every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(from, to)` transition in order.
    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    /// Every state entered, in order.
    pub fn states_entered(&self) -> Vec<StateId> {
        self.transitions().into_iter().map(|(_, to)| to).collect()
    }

    pub fn terminal(&self) -> Vec<&AppEvent> {
        self.events.iter().filter(|e| e.is_terminal()).collect()
    }

    pub fn rejections(&self) -> Vec<&'static str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::CommandRejected { reason } => Some(*reason),
                _ => None,
            })
            .collect()
    }

    pub fn status_messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Status { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<&str> {
        self.status_messages().last().copied()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
