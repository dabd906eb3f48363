//! Cycle parameter resolution.
//!
//! One canonical table covers Person, Clothes and Surrounding:
//!
//! | heat   | preheat (s) | on phase (s) |   | speed | total (s) | off phase (s) |
//! |--------|-------------|--------------|---|-------|-----------|---------------|
//! | Low    | 105         | 10           |   | 1     | 180       | 25            |
//! | Medium | 110         | 15           |   | 2     | 240       | 33            |
//! | High   | 115         | 20           |   | 3     | 300       | 41            |
//!
//! Custom mode is thermostatic instead: a heat step selects a set point
//! and the heater cycles inside `[set_point - 20, set_point + 5]`.

use log::warn;
use serde::{Deserialize, Serialize};

use super::Mode;
use crate::error::ParamError;

/// User-selected heat level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatLevel {
    Low,
    Medium,
    High,
}

impl HeatLevel {
    /// Map a 1-based UI index to a level.  Anything else falls back to
    /// `Medium` with a warning.
    pub fn from_index_or_default(idx: u8) -> Self {
        match idx {
            1 => Self::Low,
            2 => Self::Medium,
            3 => Self::High,
            other => {
                warn!("Unknown heat level {other}, falling back to Medium");
                Self::Medium
            }
        }
    }

    /// Parse `low` / `medium` / `high` (or `1`..`3`), falling back to `Medium`.
    pub fn parse_or_default(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Self::Low,
            "medium" | "2" => Self::Medium,
            "high" | "3" => Self::High,
            other => {
                warn!("Unknown heat level '{other}', falling back to Medium");
                Self::Medium
            }
        }
    }
}

/// User-selected speed level; selects the session length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedLevel {
    /// 3 minutes
    One,
    /// 4 minutes
    Two,
    /// 5 minutes
    Three,
}

impl SpeedLevel {
    /// Map a 1-based UI index to a level.  Anything else falls back to
    /// `Two` with a warning.
    pub fn from_index_or_default(idx: u8) -> Self {
        match idx {
            1 => Self::One,
            2 => Self::Two,
            3 => Self::Three,
            other => {
                warn!("Unknown speed level {other}, falling back to 2");
                Self::Two
            }
        }
    }
}

/// Hysteresis band for thermostatic heating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermostatBand {
    /// Heater comes back on below this temperature.
    pub low_c: f32,
    /// Heater goes off at or above this temperature.
    pub high_c: f32,
}

impl ThermostatBand {
    pub fn around(set_point_c: f32) -> Self {
        Self {
            low_c: set_point_c - 20.0,
            high_c: set_point_c + 5.0,
        }
    }
}

/// Immutable timing for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleParameters {
    pub preheat_seconds: u32,
    pub on_phase_seconds: u32,
    pub off_phase_seconds: u32,
    pub total_cycle_seconds: u32,
    pub fan_ramp_threshold_seconds: u32,
    /// Present only for thermostatic (Custom) cycles.
    pub thermostat: Option<ThermostatBand>,
    /// Preheat ends early once this temperature is reached.
    pub preheat_target_c: Option<f32>,
}

/// Fan ramp threshold for Clothes mode.
const CLOTHES_FAN_RAMP_SECS: u32 = 30;
/// Fan ramp threshold for every other mode.
const DEFAULT_FAN_RAMP_SECS: u32 = 60;

/// Resolve table-driven parameters.  Pure and total.
///
/// `Mode::Custom` resolves to the table values as well; thermostatic
/// Custom cycles go through [`resolve_custom`].
pub fn resolve_parameters(heat: HeatLevel, speed: SpeedLevel, mode: Mode) -> CycleParameters {
    let (preheat_seconds, on_phase_seconds) = match heat {
        HeatLevel::Low => (105, 10),
        HeatLevel::Medium => (110, 15),
        HeatLevel::High => (115, 20),
    };
    let (total_cycle_seconds, off_phase_seconds) = match speed {
        SpeedLevel::One => (180, 25),
        SpeedLevel::Two => (240, 33),
        SpeedLevel::Three => (300, 41),
    };
    let fan_ramp_threshold_seconds = match mode {
        Mode::Clothes => CLOTHES_FAN_RAMP_SECS,
        Mode::Person | Mode::Surrounding | Mode::Custom => DEFAULT_FAN_RAMP_SECS,
    };

    CycleParameters {
        preheat_seconds,
        on_phase_seconds,
        off_phase_seconds,
        total_cycle_seconds,
        fan_ramp_threshold_seconds,
        thermostat: None,
        preheat_target_c: None,
    }
}

// ---------------------------------------------------------------------------
// Custom mode
// ---------------------------------------------------------------------------

/// Set points (°C) for heat steps 1..=5.
const CUSTOM_SET_POINTS_C: [f32; 5] = [80.0, 100.0, 125.0, 150.0, 170.0];
/// Longest Custom session.
pub const CUSTOM_MAX_MINUTES: u16 = 90;
/// Upper bound on the Custom warm-up.
const CUSTOM_PREHEAT_LIMIT_SECS: u32 = 300;

/// Validated Custom-mode settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSettings {
    heat_step: u8,
    session_minutes: u16,
}

impl CustomSettings {
    pub fn new(heat_step: u8, session_minutes: u16) -> Result<Self, ParamError> {
        if !(1..=5).contains(&heat_step) {
            return Err(ParamError::HeatStepOutOfRange(heat_step));
        }
        if !(1..=CUSTOM_MAX_MINUTES).contains(&session_minutes) {
            return Err(ParamError::SessionMinutesOutOfRange(session_minutes));
        }
        Ok(Self {
            heat_step,
            session_minutes,
        })
    }

    pub fn heat_step(&self) -> u8 {
        self.heat_step
    }

    pub fn session_minutes(&self) -> u16 {
        self.session_minutes
    }

    pub fn set_point_c(&self) -> f32 {
        CUSTOM_SET_POINTS_C[usize::from(self.heat_step - 1)]
    }
}

/// Resolve thermostatic parameters for a Custom session.
///
/// On/off phase lengths equal the whole session so that only the band
/// and the session clock end a phase.
pub fn resolve_custom(settings: CustomSettings) -> Result<CycleParameters, ParamError> {
    // Re-validate: the fields are private but deserialisation bypasses `new`.
    let settings = CustomSettings::new(settings.heat_step, settings.session_minutes)?;
    let band = ThermostatBand::around(settings.set_point_c());
    let total_cycle_seconds = u32::from(settings.session_minutes) * 60;

    Ok(CycleParameters {
        preheat_seconds: (total_cycle_seconds / 2).min(CUSTOM_PREHEAT_LIMIT_SECS),
        on_phase_seconds: total_cycle_seconds,
        off_phase_seconds: total_cycle_seconds,
        total_cycle_seconds,
        fan_ramp_threshold_seconds: DEFAULT_FAN_RAMP_SECS,
        thermostat: Some(band),
        preheat_target_c: Some(band.low_c),
    })
}
