//! Cycle definition: what the caller asks for and what one run needs.
//!
//! A [`StartRequest`] is resolved once into immutable
//! [`CycleParameters`] and a [`ModePolicy`]; the control loop only ever
//! reads those two value objects.

pub mod params;
pub mod policy;

use serde::{Deserialize, Serialize};

pub use params::{
    CustomSettings, CycleParameters, HeatLevel, SpeedLevel, ThermostatBand, resolve_custom,
    resolve_parameters,
};
pub use policy::{ModePolicy, SpeedTimerStart};

use crate::error::ParamError;

/// Usage mode selected on the main screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Person,
    Clothes,
    Surrounding,
    Custom,
}

impl Mode {
    /// Case-insensitive parse of a mode name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "person" => Some(Self::Person),
            "clothes" => Some(Self::Clothes),
            "surrounding" => Some(Self::Surrounding),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Everything the caller supplies to start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub mode: Mode,
    pub heat: HeatLevel,
    pub speed: SpeedLevel,
    /// Required for [`Mode::Custom`], ignored otherwise.
    pub custom: Option<CustomSettings>,
    /// Overrides the mode's default speed-timer reference.
    pub speed_timer_start: Option<SpeedTimerStart>,
}

impl StartRequest {
    /// A table-driven request for Person, Clothes or Surrounding.
    pub fn new(mode: Mode, heat: HeatLevel, speed: SpeedLevel) -> Self {
        Self {
            mode,
            heat,
            speed,
            custom: None,
            speed_timer_start: None,
        }
    }

    /// A thermostatic Custom-mode request.
    pub fn custom(settings: CustomSettings) -> Self {
        Self {
            mode: Mode::Custom,
            heat: HeatLevel::Medium,
            speed: SpeedLevel::Two,
            custom: Some(settings),
            speed_timer_start: None,
        }
    }

    #[must_use]
    pub fn with_speed_timer_start(mut self, start: SpeedTimerStart) -> Self {
        self.speed_timer_start = Some(start);
        self
    }

    /// Resolve the immutable parameters for this request.
    pub fn parameters(&self) -> Result<CycleParameters, ParamError> {
        match self.mode {
            Mode::Custom => {
                let settings = self.custom.ok_or(ParamError::MissingCustomSettings)?;
                resolve_custom(settings)
            }
            mode => Ok(resolve_parameters(self.heat, self.speed, mode)),
        }
    }
}
