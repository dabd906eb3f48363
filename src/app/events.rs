//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: forward to the caller channel,
//! print as JSON lines, log.

use heapless::String;
use serde::Serialize;

use crate::error::Fault;
use crate::fsm::context::{AbortReason, STATUS_CAPACITY};
use crate::fsm::{CycleState, StateId};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started { state: StateId },

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Progress text and countdown for the display.
    Status {
        phase: CycleState,
        message: String<STATUS_CAPACITY>,
        seconds_remaining: Option<u32>,
    },

    /// The cycle ran to completion and the door is unlocked.
    CycleCompleted,

    /// The cycle was terminated by a fault.
    CycleFaulted { reason: Fault },

    /// The cycle ended early without a fault.
    CycleAborted { reason: AbortReason },

    /// Heater off, door unlocked and fan off have all been written.
    SafeModeEngaged,

    /// Safe mode released; the cabinet is Idle.
    SafeModeExited,

    /// A command was refused in the current state.
    CommandRejected { reason: &'static str },
}

impl AppEvent {
    /// True for the events that end a cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CycleCompleted | Self::CycleFaulted { .. } | Self::CycleAborted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::HeatPhase;

    #[test]
    fn events_serialize_as_tagged_json() {
        let json = serde_json::to_string(&AppEvent::CycleFaulted {
            reason: Fault::Overheat,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"cycle_faulted","reason":"Overheat"}"#);
    }

    #[test]
    fn status_carries_phase_and_countdown() {
        let mut message = String::new();
        message.push_str("Time left: 12s").unwrap();
        let ev = AppEvent::Status {
            phase: CycleState::Heating {
                phase: HeatPhase::On,
            },
            message,
            seconds_remaining: Some(12),
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains(r#""phase":{"Heating":{"phase":"On"}}"#), "{json}");
        assert!(json.contains(r#""seconds_remaining":12"#));
        assert!(!ev.is_terminal());
    }
}
