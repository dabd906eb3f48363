//! Inbound commands to the application service.
//!
//! These represent actions requested by the caller (touch UI, console,
//! tests) that the [`AppService`](super::service::AppService) interprets
//! and acts upon.

use serde::{Deserialize, Serialize};

use crate::cycle::StartRequest;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppCommand {
    /// Start a cycle.  Rejected unless the cabinet is Idle.
    StartCycle(StartRequest),

    /// Abort the running cycle (or disarm auto-start when Idle).
    Cancel,

    /// Heater off, door unlocked, fan off; hold until released.
    ActivateSafeMode,

    /// Leave safe mode for Idle.
    ExitSafeMode,

    /// Start this request automatically once something is placed in the
    /// chamber.
    ArmAutoStart(StartRequest),

    /// Forget the armed auto-start request.
    DisarmAutoStart,
}
