//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It holds this tick's sensor samples, the actuator state the
//! handlers want, the running cycle, the status line shown to the caller,
//! configuration, and latched safety faults.  Think of it as the
//! "blackboard" in a blackboard architecture.

use core::fmt::{self, Write};

use heapless::String;
use serde::Serialize;

use crate::config::CabinetConfig;
use crate::cycle::{CycleParameters, ModePolicy, SpeedTimerStart, StartRequest};
use crate::error::Fault;

// ---------------------------------------------------------------------------
// Sensor samples (read-only to state handlers; written by the service)
// ---------------------------------------------------------------------------

/// What one sensor contributed to the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Sample {
    /// Not polled this tick.
    #[default]
    Skipped,
    /// Read successfully this tick.
    Fresh(f32),
    /// Polled, but both attempts failed.  Comparisons must be skipped.
    Unknown,
}

impl Sample {
    /// The value, only if it was read this tick.
    pub fn fresh(self) -> Option<f32> {
        match self {
            Self::Fresh(v) => Some(v),
            Self::Skipped | Self::Unknown => None,
        }
    }
}

/// Per-tick samples of both sensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    /// Chamber temperature (°C).
    pub temperature: Sample,
    /// Load-cell weight (kg).
    pub weight: Sample,
}

// ---------------------------------------------------------------------------
// Actuator state (written by state handlers; applied by the service)
// ---------------------------------------------------------------------------

/// Heater, door and fan as the handlers want them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    pub heater_on: bool,
    pub door_locked: bool,
    /// 0–100 %.
    pub fan_duty_percent: u8,
}

impl ActuatorState {
    /// Heater off, door unlocked, fan stopped.
    pub const SAFE: Self = Self {
        heater_on: false,
        door_locked: false,
        fan_duty_percent: 0,
    };
}

impl Default for ActuatorState {
    fn default() -> Self {
        Self::SAFE
    }
}

// ---------------------------------------------------------------------------
// Cycle run
// ---------------------------------------------------------------------------

/// Mutable bookkeeping for one cycle.  Created on Start, dropped when
/// the FSM returns to Idle or enters SafeMode.
#[derive(Debug, Clone, Copy)]
pub struct CycleRun {
    pub request: StartRequest,
    pub params: CycleParameters,
    pub policy: ModePolicy,
    /// Preheat seconds counted so far (frozen while paused).
    pub preheat_elapsed: u32,
    /// Session seconds counted so far (frozen while paused).
    pub cycle_elapsed: u32,
    /// Whether the session clock has been started.
    pub speed_clock_running: bool,
    /// The door has been opened for entry and must not be re-locked.
    pub door_released: bool,
    pub entry_confirmed: bool,
    /// Consecutive seconds the chamber read empty after unlock.
    pub no_entry_secs: u32,
    /// Preheat paused waiting for entry.
    pub paused: bool,
    /// Fan stepped up from idle duty.
    pub fan_ramped: bool,
}

impl CycleRun {
    pub fn new(request: StartRequest, params: CycleParameters, policy: ModePolicy) -> Self {
        Self {
            request,
            params,
            policy,
            preheat_elapsed: 0,
            cycle_elapsed: 0,
            speed_clock_running: policy.speed_timer_start == SpeedTimerStart::StartClick,
            door_released: false,
            entry_confirmed: false,
            no_entry_secs: 0,
            paused: false,
            fan_ramped: false,
        }
    }

    /// Advance the session clock by one second if it is running.
    pub fn tick_cycle_clock(&mut self) {
        if self.speed_clock_running && !self.paused {
            self.cycle_elapsed = self.cycle_elapsed.saturating_add(1);
        }
    }

    /// Advance both preheat and session clocks by one second.
    pub fn tick_preheat(&mut self) {
        if self.paused {
            return;
        }
        self.preheat_elapsed = (self.preheat_elapsed + 1).min(self.params.preheat_seconds);
        self.tick_cycle_clock();
    }

    pub fn preheat_remaining(&self) -> u32 {
        self.params.preheat_seconds.saturating_sub(self.preheat_elapsed)
    }

    pub fn cycle_remaining(&self) -> u32 {
        self.params
            .total_cycle_seconds
            .saturating_sub(self.cycle_elapsed)
    }

    pub fn cycle_over(&self) -> bool {
        self.speed_clock_running && self.cycle_elapsed >= self.params.total_cycle_seconds
    }
}

// ---------------------------------------------------------------------------
// Outcome and status
// ---------------------------------------------------------------------------

/// Why a cycle ended early without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    /// Weight on the load cell in the non-adult range.
    DisqualifiedOccupant,
    /// The caller cancelled.
    Cancelled,
    /// Safe mode was engaged mid-cycle.
    SafeMode,
}

/// How a cycle ended.  Written by handlers, taken by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    Faulted(Fault),
    Aborted(AbortReason),
}

/// Capacity of the status message.
pub const STATUS_CAPACITY: usize = 96;

/// Text and countdown for the caller's display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusLine {
    pub message: String<STATUS_CAPACITY>,
    pub seconds_remaining: Option<u32>,
}

impl StatusLine {
    /// Replace the message.  Fragments that do not fit are dropped.
    pub fn set(&mut self, args: fmt::Arguments<'_>, seconds_remaining: Option<u32>) {
        self.message.clear();
        let _ = self.message.write_fmt(args);
        self.seconds_remaining = seconds_remaining;
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
///
/// One tick is one second of cycle time.
pub struct FsmContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,

    // -- Sensor data --
    /// Samples taken this tick.  Updated before each FSM tick.
    pub sensors: SensorSnapshot,

    // -- Actuator outputs --
    /// Desired actuator state, applied after the FSM tick.
    pub commands: ActuatorState,

    // -- Configuration --
    pub config: CabinetConfig,

    // -- Safety --
    /// Latched fault bitmask (see `Fault::mask()`), set by the supervisor.
    pub fault_flags: u8,

    // -- Cycle --
    pub run: Option<CycleRun>,
    pub status: StatusLine,
    /// Set by a handler when a cycle ends; the service takes it.
    pub outcome: Option<CycleOutcome>,
}

impl FsmContext {
    /// Create a new context with the given configuration.
    pub fn new(config: CabinetConfig) -> Self {
        Self {
            ticks_in_state: 0,
            sensors: SensorSnapshot::default(),
            commands: ActuatorState::SAFE,
            config,
            fault_flags: 0,
            run: None,
            status: StatusLine::default(),
            outcome: None,
        }
    }

    /// Seconds elapsed since the current state was entered.
    pub fn secs_in_state(&self) -> u32 {
        self.ticks_in_state.min(u64::from(u32::MAX)) as u32
    }

    /// Check whether a specific fault flag is set.
    pub fn has_fault(&self, fault: Fault) -> bool {
        self.fault_flags & fault.mask() != 0
    }

    /// Convenience wrapper around [`StatusLine::set`].
    pub fn set_status(&mut self, args: fmt::Arguments<'_>, seconds_remaining: Option<u32>) {
        self.status.set(args, seconds_remaining);
    }

    /// Record how the current cycle ended.
    pub fn finish(&mut self, outcome: CycleOutcome) {
        self.outcome = Some(outcome);
    }
}
