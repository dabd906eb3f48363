//! Bakhoor cabinet control library.
//!
//! Exposes the control core for the console runner, integration tests and
//! any front end that wants to drive a cabinet.  Hardware access lives
//! behind the port traits in [`app::ports`]; [`adapters`] provides the
//! deployed and simulated implementations.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod cycle;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod safety;
pub mod sensors;

pub use app::controller::{CabinetController, CabinetSnapshot, ControllerHandle};
pub use config::CabinetConfig;
pub use cycle::{CustomSettings, HeatLevel, Mode, SpeedLevel, SpeedTimerStart, StartRequest};
pub use error::{Error, Result};
