//! Cabinet configuration parameters
//!
//! All tunable thresholds and timings for the bakhoor cabinet in one place.
//! There is no persisted file format; the console runner accepts an inline
//! JSON override and everything else uses [`CabinetConfig::default`].

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Core cabinet configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CabinetConfig {
    // --- Temperature ---
    /// Chamber temperature (°C) that aborts any cycle as an overheat fault
    pub overheat_emergency_c: f32,
    /// A latched overheat clears only below this temperature (°C)
    pub overheat_clear_below_c: f32,
    /// Consecutive fresh readings below `overheat_clear_below_c` that clear an overheat
    pub overheat_clear_readings: u8,
    /// Temperature (°C) at which the heater is cut during heating phases
    pub heater_cutoff_c: f32,
    /// Temperature poll interval during heating, cooldown and safety wait (seconds)
    pub heating_temp_poll_secs: u32,

    // --- Weight / entry gate ---
    /// Below this weight (kg) the chamber counts as empty
    pub entry_empty_below_kg: f32,
    /// Above this weight (kg) an adult occupant is confirmed
    pub adult_min_kg: f32,
    /// Consecutive empty seconds after unlock before the preheat pauses
    pub no_entry_pause_after_secs: u32,
    /// Preheat seconds before the door unlocks in Person mode
    pub person_door_unlock_after_secs: u32,

    // --- Fan ---
    /// Fan duty while preheating (0-100%)
    pub fan_idle_duty: u8,
    /// Fan duty after the ramp threshold (0-100%)
    pub fan_ramp_duty: u8,
    /// Fan duty during cooldown (0-100%)
    pub cooldown_fan_duty: u8,

    // --- Post-cycle ---
    /// Forced-fan cooldown length (seconds)
    pub cooldown_secs: u32,
    /// Safety countdown before unlock (seconds)
    pub safety_wait_secs: u32,
    /// Settle delay after unlocking the door (seconds)
    pub unlock_settle_secs: u32,

    // --- Sensors ---
    /// Upper bound on one serial sensor round trip (milliseconds)
    pub sensor_timeout_ms: u32,
    /// A last-known reading older than this is stale (seconds)
    pub sensor_freshness_secs: u32,

    // --- Auto-start ---
    /// Accept requests to arm auto-start
    pub auto_start_enabled: bool,
    /// Mean weight (kg) over the window that triggers auto-start
    pub auto_start_weight_kg: f32,
    /// Number of one-second weight samples in the auto-start window
    pub auto_start_window_secs: u32,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u32,
}

impl Default for CabinetConfig {
    fn default() -> Self {
        Self {
            // Temperature
            overheat_emergency_c: 450.0,
            overheat_clear_below_c: 150.0,
            overheat_clear_readings: 3,
            heater_cutoff_c: 150.0,
            heating_temp_poll_secs: 5,

            // Entry gate
            entry_empty_below_kg: 10.0,
            adult_min_kg: 50.0,
            no_entry_pause_after_secs: 15,
            person_door_unlock_after_secs: 30,

            // Fan
            fan_idle_duty: 10,
            fan_ramp_duty: 25,
            cooldown_fan_duty: 100,

            // Post-cycle
            cooldown_secs: 180,
            safety_wait_secs: 300,
            unlock_settle_secs: 2,

            // Sensors
            sensor_timeout_ms: 2000,
            sensor_freshness_secs: 10,

            // Auto-start
            auto_start_enabled: false,
            auto_start_weight_kg: 4.0,
            auto_start_window_secs: 10,

            // Timing
            control_loop_interval_ms: 1000, // 1 Hz
        }
    }
}

/// Largest auto-start window the fixed-capacity sample buffer can hold.
pub const MAX_AUTO_START_WINDOW: usize = 32;

impl CabinetConfig {
    /// Reject settings that would make the cycle unsafe or meaningless.
    ///
    /// Values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.heater_cutoff_c > 0.0 && self.heater_cutoff_c < self.overheat_emergency_c) {
            return Err(Error::Config("heater_cutoff_c must be in (0, overheat_emergency_c)"));
        }
        if self.overheat_clear_below_c >= self.overheat_emergency_c {
            return Err(Error::Config("overheat_clear_below_c must be below overheat_emergency_c"));
        }
        if self.overheat_clear_readings == 0 {
            return Err(Error::Config("overheat_clear_readings must be non-zero"));
        }
        if self.heating_temp_poll_secs == 0 {
            return Err(Error::Config("heating_temp_poll_secs must be non-zero"));
        }
        if !(self.entry_empty_below_kg >= 0.0 && self.entry_empty_below_kg <= self.adult_min_kg) {
            return Err(Error::Config("entry_empty_below_kg must be in [0, adult_min_kg]"));
        }
        if self.no_entry_pause_after_secs == 0 {
            return Err(Error::Config("no_entry_pause_after_secs must be non-zero"));
        }
        if self.fan_idle_duty > 100 || self.fan_ramp_duty > 100 || self.cooldown_fan_duty > 100 {
            return Err(Error::Config("fan duties must be 0-100"));
        }
        if self.sensor_timeout_ms == 0 || self.sensor_timeout_ms > 2000 {
            return Err(Error::Config("sensor_timeout_ms must be in 1..=2000"));
        }
        if self.auto_start_window_secs == 0
            || self.auto_start_window_secs as usize > MAX_AUTO_START_WINDOW
        {
            return Err(Error::Config("auto_start_window_secs out of range"));
        }
        if self.control_loop_interval_ms == 0 {
            return Err(Error::Config("control_loop_interval_ms must be non-zero"));
        }
        Ok(())
    }

    /// Parse a JSON override on top of the defaults, then validate it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON config"))?;
        config.validate()?;
        Ok(config)
    }
}
