//! Per-mode behaviour switches for the single control loop.

use serde::{Deserialize, Serialize};

use super::Mode;
use crate::config::CabinetConfig;

/// Reference point for the session ("speed") clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedTimerStart {
    /// The clock starts when Start is accepted.
    StartClick,
    /// The clock starts when the door locks for preheat.
    DoorLock,
}

/// What differs between modes.  Everything else is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    /// Gate the preheat on an adult entering (Person).
    pub entry_gate: bool,
    /// Unlock the door after this many preheat seconds.
    pub door_unlock_after_secs: Option<u32>,
    /// Refuse to lock until the chamber reads empty (Clothes).
    pub chamber_clear_check: bool,
    pub speed_timer_start: SpeedTimerStart,
}

impl ModePolicy {
    pub fn for_mode(mode: Mode, config: &CabinetConfig) -> Self {
        match mode {
            Mode::Person => Self {
                entry_gate: true,
                door_unlock_after_secs: Some(config.person_door_unlock_after_secs),
                chamber_clear_check: false,
                speed_timer_start: SpeedTimerStart::StartClick,
            },
            Mode::Clothes => Self {
                entry_gate: false,
                door_unlock_after_secs: None,
                chamber_clear_check: true,
                speed_timer_start: SpeedTimerStart::StartClick,
            },
            Mode::Surrounding => Self {
                entry_gate: false,
                door_unlock_after_secs: None,
                chamber_clear_check: false,
                speed_timer_start: SpeedTimerStart::DoorLock,
            },
            Mode::Custom => Self {
                entry_gate: false,
                door_unlock_after_secs: None,
                chamber_clear_check: false,
                speed_timer_start: SpeedTimerStart::StartClick,
            },
        }
    }

    /// Apply a caller-specified speed-timer reference, if any.
    #[must_use]
    pub fn with_speed_timer_start(mut self, start: Option<SpeedTimerStart>) -> Self {
        if let Some(start) = start {
            self.speed_timer_start = start;
        }
        self
    }
}
