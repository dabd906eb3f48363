//! Application core: cycle orchestration, zero I/O.
//!
//! This module contains the business rules for the cabinet: FSM
//! orchestration, safety evaluation, sensor polling cadence and actuator
//! reconciliation.  All interaction with hardware happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable without
//! real peripherals.  [`controller`] runs the service on its own thread and
//! talks to it through [`channels`].

pub mod channels;
pub mod commands;
pub mod controller;
pub mod events;
pub mod ports;
pub mod service;
