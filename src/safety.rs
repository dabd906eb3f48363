//! Safety supervisor.
//!
//! The supervisor runs **every tick before the FSM** and maintains the
//! fault bitmask copied into `FsmContext.fault_flags`.  Every cycle state
//! checks the mask first and drops to `Idle` with the heater off when
//! `Overheat` is set.
//!
//! ## Fault lifecycle
//!
//! 1. A fresh temperature at or above the emergency limit sets `Overheat`.
//! 2. The FSM leaves whatever cycle state it is in; `idle_enter` kills the
//!    heater and fan.
//! 3. The bit stays latched while readings are missing or stale.  It
//!    clears only after `overheat_clear_readings` consecutive fresh
//!    readings below `overheat_clear_below_c`; a warmer reading restarts
//!    the count.
//! 4. A new cycle is refused while the bit is set.
//!
//! `ActuatorWriteFailure` is latched by the service itself (see
//! [`SafetySupervisor::latch`]) and cleared on the next accepted start.

use crate::config::CabinetConfig;
use crate::error::Fault;
use crate::fsm::context::{Sample, SensorSnapshot};
use log::{error, info};

/// Safety supervisor.
pub struct SafetySupervisor {
    overheat_c: f32,
    clear_below_c: f32,
    clear_readings: u8,
    /// Consecutive cool readings seen while `Overheat` is latched.
    cool_streak: u8,
    /// Latched fault bitmask.
    faults: u8,
}

impl SafetySupervisor {
    pub fn new(config: &CabinetConfig) -> Self {
        Self {
            overheat_c: config.overheat_emergency_c,
            clear_below_c: config.overheat_clear_below_c,
            clear_readings: config.overheat_clear_readings.max(1),
            cool_streak: 0,
            faults: 0,
        }
    }

    /// Evaluate all safety conditions against this tick's samples.
    /// Returns the updated fault bitmask.
    pub fn evaluate(&mut self, snap: &SensorSnapshot) -> u8 {
        // ── Temperature ───────────────────────────────────────────
        // Missing data never clears a latched overheat.
        if let Sample::Fresh(celsius) = snap.temperature {
            if celsius >= self.overheat_c {
                if !self.has_fault(Fault::Overheat) {
                    error!(
                        "Temperature exceeded {:.0}°C ({celsius:.1}°C)! Heater has been shut down.",
                        self.overheat_c
                    );
                }
                self.cool_streak = 0;
                self.eval_fault(Fault::Overheat, true);
            } else if self.has_fault(Fault::Overheat) {
                if celsius < self.clear_below_c {
                    self.cool_streak = self.cool_streak.saturating_add(1);
                } else {
                    self.cool_streak = 0;
                }
                if self.cool_streak >= self.clear_readings {
                    self.cool_streak = 0;
                    self.eval_fault(Fault::Overheat, false);
                }
            }
        }

        self.faults
    }

    /// Latch a fault raised outside sensor evaluation.
    pub fn latch(&mut self, fault: Fault) {
        self.eval_fault(fault, true);
    }

    /// Clear a fault the caller has recovered from.
    pub fn clear(&mut self, fault: Fault) {
        self.eval_fault(fault, false);
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// Check if a specific fault is active.
    pub fn has_fault(&self, fault: Fault) -> bool {
        self.faults & fault.mask() != 0
    }

    // ── Internal ──────────────────────────────────────────────────

    /// Set or clear a fault bit based on a boolean condition.
    fn eval_fault(&mut self, fault: Fault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("SAFETY FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("SAFETY FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }
}
