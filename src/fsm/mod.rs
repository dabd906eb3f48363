//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern in Rust:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌─────────────────┬──────────┬─────────┬───────────────────┐│
//! │  │ StateId         │ on_enter │ on_exit │ on_update         ││
//! │  ├─────────────────┼──────────┼─────────┼───────────────────┤│
//! │  │ Idle            │ fn(ctx)  │    -    │ fn(ctx)->Option<> ││
//! │  │ ClearingChamber │ fn(ctx)  │    -    │ fn(ctx)->Option<> ││
//! │  │ Preheating      │ fn(ctx)  │    -    │ fn(ctx)->Option<> ││
//! │  │ ...             │          │         │                   ││
//! │  │ SafeMode        │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option<> ││
//! │  └─────────────────┴──────────┴─────────┴───────────────────┘│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext` which
//! holds sensor samples, desired actuator state, the running cycle,
//! config, and timing.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;
use serde::Serialize;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all possible controller states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    ClearingChamber = 1,
    Preheating = 2,
    AwaitingEntry = 3,
    HeatingOn = 4,
    HeatingOff = 5,
    Cooldown = 6,
    SafetyWait = 7,
    Unlocking = 8,
    SafeMode = 9,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 10;

    /// Convert a `usize` index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `SafeMode` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::ClearingChamber,
            2 => Self::Preheating,
            3 => Self::AwaitingEntry,
            4 => Self::HeatingOn,
            5 => Self::HeatingOff,
            6 => Self::Cooldown,
            7 => Self::SafetyWait,
            8 => Self::Unlocking,
            9 => Self::SafeMode,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::SafeMode
            }
        }
    }

    /// True while a cycle owns the actuators.
    pub fn is_cycle_active(self) -> bool {
        !matches!(self, Self::Idle | Self::SafeMode)
    }

    /// The caller-facing view of this state.
    pub fn cycle_state(self) -> CycleState {
        match self {
            Self::Idle => CycleState::Idle,
            Self::ClearingChamber => CycleState::ClearingChamber,
            Self::Preheating => CycleState::Preheating,
            Self::AwaitingEntry => CycleState::AwaitingEntry,
            Self::HeatingOn => CycleState::Heating {
                phase: HeatPhase::On,
            },
            Self::HeatingOff => CycleState::Heating {
                phase: HeatPhase::Off,
            },
            Self::Cooldown => CycleState::Cooldown,
            Self::SafetyWait => CycleState::SafetyWait,
            Self::Unlocking => CycleState::Unlocking,
            Self::SafeMode => CycleState::SafeMode,
        }
    }
}

/// Heater phase inside [`CycleState::Heating`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HeatPhase {
    On,
    Off,
}

/// Tagged cycle state as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CycleState {
    Idle,
    ClearingChamber,
    Preheating,
    AwaitingEntry,
    Heating { phase: HeatPhase },
    Cooldown,
    SafetyWait,
    Unlocking,
    SafeMode,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array: no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]) and is driven with a
/// mutable [`FsmContext`] that is threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Increment the tick counter and refresh context timing.
    /// 2. Call `on_update` for the current state.
    /// 3. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (used for Start, Cancel and SafeMode
    /// regardless of what `on_update` would return).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
