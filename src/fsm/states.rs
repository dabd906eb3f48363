//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.  Mode differences live in the run's
//! [`ModePolicy`](crate::cycle::ModePolicy), not in separate state sets.
//!
//! ```text
//!  IDLE ──[start]──▶ CLEARING_CHAMBER ──[empty]──┐   (Clothes)
//!    │                                           ▼
//!    └──────[start]─────────────────────────▶ PREHEATING ◀──[adult]── AWAITING_ENTRY
//!                                                │   └──[door unlock]──────▲
//!                                      [preheat done]                (Person)
//!                                                ▼
//!                      HEATING_ON ◀──[off phase done]── HEATING_OFF
//!                          └──[on phase done / ≥ cutoff]──▲
//!                                                │
//!                                         [cycle over]
//!                                                ▼
//!        IDLE ◀──[settle]── UNLOCKING ◀── SAFETY_WAIT ◀── COOLDOWN
//!
//!  Any cycle state ──[overheat]──▶ IDLE
//!  Any state ──[safe mode]──▶ SAFE_MODE ──[exit]──▶ IDLE
//! ```

use super::context::{AbortReason, ActuatorState, CycleOutcome, FsmContext, Sample};
use super::{StateDescriptor, StateId};
use crate::cycle::SpeedTimerStart;
use crate::error::Fault;
use log::{error, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: ClearingChamber
        StateDescriptor {
            id: StateId::ClearingChamber,
            name: "ClearingChamber",
            on_enter: Some(clearing_enter),
            on_exit: None,
            on_update: clearing_update,
        },
        // Index 2: Preheating
        StateDescriptor {
            id: StateId::Preheating,
            name: "Preheating",
            on_enter: Some(preheating_enter),
            on_exit: None,
            on_update: preheating_update,
        },
        // Index 3: AwaitingEntry
        StateDescriptor {
            id: StateId::AwaitingEntry,
            name: "AwaitingEntry",
            on_enter: Some(awaiting_entry_enter),
            on_exit: None,
            on_update: awaiting_entry_update,
        },
        // Index 4: HeatingOn
        StateDescriptor {
            id: StateId::HeatingOn,
            name: "HeatingOn",
            on_enter: Some(heating_on_enter),
            on_exit: Some(heating_on_exit),
            on_update: heating_on_update,
        },
        // Index 5: HeatingOff
        StateDescriptor {
            id: StateId::HeatingOff,
            name: "HeatingOff",
            on_enter: Some(heating_off_enter),
            on_exit: None,
            on_update: heating_off_update,
        },
        // Index 6: Cooldown
        StateDescriptor {
            id: StateId::Cooldown,
            name: "Cooldown",
            on_enter: Some(cooldown_enter),
            on_exit: None,
            on_update: cooldown_update,
        },
        // Index 7: SafetyWait
        StateDescriptor {
            id: StateId::SafetyWait,
            name: "SafetyWait",
            on_enter: Some(safety_wait_enter),
            on_exit: None,
            on_update: safety_wait_update,
        },
        // Index 8: Unlocking
        StateDescriptor {
            id: StateId::Unlocking,
            name: "Unlocking",
            on_enter: Some(unlocking_enter),
            on_exit: None,
            on_update: unlocking_update,
        },
        // Index 9: SafeMode
        StateDescriptor {
            id: StateId::SafeMode,
            name: "SafeMode",
            on_enter: Some(safe_mode_enter),
            on_exit: Some(safe_mode_exit),
            on_update: safe_mode_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Overheat overrides every other transition of a running cycle.
fn fault_guard(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_fault(Fault::Overheat) {
        let limit = ctx.config.overheat_emergency_c;
        ctx.commands.heater_on = false;
        ctx.set_status(
            format_args!("Temperature exceeded {limit:.0}°C! Heater has been shut down."),
            None,
        );
        ctx.finish(CycleOutcome::Faulted(Fault::Overheat));
        return Some(StateId::Idle);
    }
    None
}

/// Step the fan up once preheat passes the ramp threshold.
fn ramp_fan_if_due(ctx: &mut FsmContext) {
    let ramp_duty = ctx.config.fan_ramp_duty;
    if let Some(run) = ctx.run.as_mut()
        && !run.fan_ramped
        && run.preheat_elapsed >= run.params.fan_ramp_threshold_seconds
    {
        run.fan_ramped = true;
        ctx.commands.fan_duty_percent = ramp_duty;
        info!("PREHEAT: fan ramped to {}%", ramp_duty);
    }
}

/// A running cycle without a run record is a programming error; drop to
/// Idle rather than guess.
fn missing_run(state: &str) -> Option<StateId> {
    error!("{state}: no cycle run present, returning to Idle");
    Some(StateId::Idle)
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    // Heater and fan off.  The door keeps whatever position it had.
    ctx.commands.heater_on = false;
    ctx.commands.fan_duty_percent = 0;
    ctx.run = None;
    // A cycle that just ended keeps its closing message on screen.
    if ctx.outcome.is_none() {
        ctx.set_status(format_args!("Select a mode"), None);
    }
    info!("IDLE: heater off, fan off, door locked={}", ctx.commands.door_locked);
}

fn idle_update(_ctx: &mut FsmContext) -> Option<StateId> {
    // Cycles are started by the service.
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CLEARING_CHAMBER state: Clothes mode refuses to lock on a loaded chamber
// ═══════════════════════════════════════════════════════════════════════════

fn clearing_enter(ctx: &mut FsmContext) {
    ctx.commands.heater_on = false;
    ctx.set_status(format_args!("Waiting for chamber to be empty..."), None);
    info!("CLEARING: checking the chamber is empty before locking");
}

fn clearing_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    let empty_below = ctx.config.entry_empty_below_kg;
    let Some(run) = ctx.run.as_mut() else {
        return missing_run("CLEARING");
    };
    run.tick_cycle_clock();

    match ctx.sensors.weight {
        Sample::Fresh(kg) if kg < empty_below => {
            ctx.set_status(
                format_args!("Chamber empty. Locking door and starting cycle."),
                None,
            );
            Some(StateId::Preheating)
        }
        Sample::Fresh(kg) => {
            ctx.commands.door_locked = false;
            ctx.set_status(
                format_args!("Weight detected. Please remove any objects and close the door."),
                None,
            );
            info!("CLEARING: {kg:.1} kg in chamber, door unlocked");
            None
        }
        Sample::Skipped | Sample::Unknown => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PREHEATING state
// ═══════════════════════════════════════════════════════════════════════════

fn preheating_enter(ctx: &mut FsmContext) {
    let idle_duty = ctx.config.fan_idle_duty;
    let ramp_duty = ctx.config.fan_ramp_duty;
    let Some(run) = ctx.run.as_mut() else {
        return;
    };

    ctx.commands.heater_on = true;
    ctx.commands.fan_duty_percent = if run.fan_ramped { ramp_duty } else { idle_duty };

    if !run.door_released {
        ctx.commands.door_locked = true;
        if run.policy.speed_timer_start == SpeedTimerStart::DoorLock && !run.speed_clock_running {
            run.speed_clock_running = true;
            info!("PREHEAT: door locked, session clock started");
        }
    }

    let remaining = run.preheat_remaining();
    if run.entry_confirmed {
        ctx.set_status(
            format_args!("Entry detected. Continuing preheat: {remaining}s left."),
            Some(remaining),
        );
    } else {
        ctx.set_status(format_args!("Heater ON for {remaining}s"), Some(remaining));
    }
    info!("PREHEAT: heater on, {}s left", remaining);
}

fn preheating_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    let temperature = ctx.sensors.temperature;
    let Some(run) = ctx.run.as_mut() else {
        return missing_run("PREHEAT");
    };
    run.tick_preheat();
    let run = *run;
    ramp_fan_if_due(ctx);

    // Person: open the door for entry part-way through preheat.
    if let Some(unlock_at) = run.policy.door_unlock_after_secs
        && !run.door_released
        && run.preheat_elapsed >= unlock_at
    {
        ctx.commands.door_locked = false;
        if let Some(r) = ctx.run.as_mut() {
            r.door_released = true;
        }
        ctx.set_status(format_args!("Unlocking door. Please enter chamber."), None);
        info!("PREHEAT: door unlocked for entry at {}s", run.preheat_elapsed);
        if run.policy.entry_gate && !run.entry_confirmed {
            return Some(StateId::AwaitingEntry);
        }
    }

    // Thermostatic cycles stop preheating at the band floor.
    if let (Some(target), Some(celsius)) = (run.params.preheat_target_c, temperature.fresh())
        && celsius >= target
    {
        info!("PREHEAT: {celsius:.1}°C reached target {target:.1}°C");
        ctx.set_status(format_args!("Preheat done. Starting main heat cycle."), None);
        return Some(StateId::HeatingOn);
    }

    let remaining = run.preheat_remaining();
    if remaining == 0 {
        ctx.commands.heater_on = false;
        ctx.set_status(format_args!("Preheat complete. Heater OFF."), None);
        info!("PREHEAT: complete after {}s", run.preheat_elapsed);
        return Some(StateId::HeatingOn);
    }

    match run.policy.door_unlock_after_secs {
        Some(unlock_at) if !run.door_released => ctx.set_status(
            format_args!("Door unlocks in {}s", unlock_at.saturating_sub(run.preheat_elapsed)),
            Some(remaining),
        ),
        Some(_) => ctx.set_status(
            format_args!("Preheating: ({remaining}s left)"),
            Some(remaining),
        ),
        None => ctx.set_status(
            format_args!("Heater ON. {remaining}s left"),
            Some(remaining),
        ),
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_ENTRY state: Person mode entry gate
// ═══════════════════════════════════════════════════════════════════════════

fn awaiting_entry_enter(_ctx: &mut FsmContext) {
    info!("ENTRY: door open, waiting for occupant");
}

fn awaiting_entry_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    let cfg = ctx.config;
    let weight = ctx.sensors.weight;
    let Some(run) = ctx.run.as_mut() else {
        return missing_run("ENTRY");
    };
    run.tick_preheat();
    let was_paused = run.paused;

    match weight {
        Sample::Fresh(kg) if kg > cfg.adult_min_kg => {
            run.entry_confirmed = true;
            run.paused = false;
            run.no_entry_secs = 0;
            ctx.commands.heater_on = true;
            if was_paused {
                info!("ENTRY: {kg:.1} kg detected, preheat resumed");
            } else {
                info!("ENTRY: {kg:.1} kg detected, preheat continues");
            }
            return Some(StateId::Preheating);
        }
        // While paused only an adult resumes the cycle.
        Sample::Fresh(_) | Sample::Unknown if was_paused => {}
        Sample::Fresh(kg) if kg >= cfg.entry_empty_below_kg => {
            warn!("ENTRY: {kg:.1} kg is not an adult, aborting");
            ctx.commands.heater_on = false;
            ctx.set_status(format_args!("Warning: not an adult. Heater OFF."), None);
            ctx.finish(CycleOutcome::Aborted(AbortReason::DisqualifiedOccupant));
            return Some(StateId::Idle);
        }
        // An unreadable load cell counts as an empty chamber.
        Sample::Fresh(_) | Sample::Unknown => {
            run.no_entry_secs += 1;
            if run.no_entry_secs >= cfg.no_entry_pause_after_secs {
                run.paused = true;
                ctx.commands.heater_on = false;
                info!(
                    "ENTRY: no entry for {}s, preheat paused at {}s",
                    run.no_entry_secs, run.preheat_elapsed
                );
            }
        }
        Sample::Skipped => {}
    }

    let run = *run;
    ramp_fan_if_due(ctx);
    if run.paused {
        ctx.set_status(format_args!("Heater paused. Please enter chamber."), None);
    } else {
        let remaining = run.preheat_remaining();
        ctx.set_status(
            format_args!("Waiting for entry. Please enter the chamber."),
            Some(remaining),
        );
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HEATING_ON state
// ═══════════════════════════════════════════════════════════════════════════

fn heating_on_enter(ctx: &mut FsmContext) {
    let ramp_duty = ctx.config.fan_ramp_duty;
    ctx.commands.heater_on = true;
    ctx.commands.fan_duty_percent = ramp_duty;
    if let Some(run) = ctx.run.as_mut() {
        run.fan_ramped = true;
        run.speed_clock_running = true;
        let remaining = run.cycle_remaining();
        ctx.set_status(format_args!("Time left: {remaining}s"), Some(remaining));
    }
}

fn heating_on_exit(ctx: &mut FsmContext) {
    ctx.commands.heater_on = false;
}

fn heating_on_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    let cutoff = ctx.config.heater_cutoff_c;
    let temperature = ctx.sensors.temperature;
    let secs = ctx.secs_in_state();
    let Some(run) = ctx.run.as_mut() else {
        return missing_run("HEAT_ON");
    };
    run.tick_cycle_clock();
    let run = *run;

    if run.cycle_over() {
        ctx.commands.heater_on = false;
        ctx.set_status(format_args!("Heating cycle complete. Heater OFF."), None);
        return Some(StateId::Cooldown);
    }

    if let Some(celsius) = temperature.fresh() {
        if celsius >= cutoff {
            ctx.commands.heater_on = false;
            ctx.set_status(
                format_args!(
                    "Temperature >{cutoff:.0}°C ({celsius:.0}°C). Heater OFF for {}s.",
                    run.params.off_phase_seconds
                ),
                Some(run.cycle_remaining()),
            );
            info!("HEAT_ON: {celsius:.1}°C ≥ {cutoff:.0}°C, cutting heater early");
            return Some(StateId::HeatingOff);
        }
        if let Some(band) = run.params.thermostat
            && celsius >= band.high_c
        {
            info!("HEAT_ON: {celsius:.1}°C reached band top {:.0}°C", band.high_c);
            return Some(StateId::HeatingOff);
        }
    } else if temperature == Sample::Unknown && run.params.thermostat.is_some() {
        // A thermostat cannot hold the heater on blind.
        warn!("HEAT_ON: temperature unknown, thermostat drops to off phase");
        return Some(StateId::HeatingOff);
    }

    if secs >= run.params.on_phase_seconds {
        return Some(StateId::HeatingOff);
    }

    let remaining = run.cycle_remaining();
    ctx.set_status(format_args!("Time left: {remaining}s"), Some(remaining));
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HEATING_OFF state
// ═══════════════════════════════════════════════════════════════════════════

fn heating_off_enter(ctx: &mut FsmContext) {
    ctx.commands.heater_on = false;
}

fn heating_off_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    let cutoff = ctx.config.heater_cutoff_c;
    let temperature = ctx.sensors.temperature;
    let secs = ctx.secs_in_state();
    let Some(run) = ctx.run.as_mut() else {
        return missing_run("HEAT_OFF");
    };
    run.tick_cycle_clock();
    let run = *run;

    if run.cycle_over() {
        ctx.set_status(format_args!("Heating cycle complete. Heater OFF."), None);
        return Some(StateId::Cooldown);
    }

    let remaining = run.cycle_remaining();
    if let Some(celsius) = temperature.fresh() {
        if celsius >= cutoff {
            ctx.set_status(
                format_args!("Temperature >{cutoff:.0}°C ({celsius:.0}°C). Heater remains OFF."),
                Some(remaining),
            );
            info!("HEAT_OFF: {celsius:.1}°C, heater remains off");
            return None;
        }
        if let Some(band) = run.params.thermostat {
            if celsius < band.low_c {
                info!("HEAT_OFF: {celsius:.1}°C below band floor {:.0}°C", band.low_c);
                return Some(StateId::HeatingOn);
            }
            ctx.set_status(format_args!("Time left: {remaining}s"), Some(remaining));
            return None;
        }
    }

    if run.params.thermostat.is_none() && secs >= run.params.off_phase_seconds {
        return Some(StateId::HeatingOn);
    }

    ctx.set_status(format_args!("Time left: {remaining}s"), Some(remaining));
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COOLDOWN state: forced fan purge
// ═══════════════════════════════════════════════════════════════════════════

fn cooldown_enter(ctx: &mut FsmContext) {
    ctx.commands.heater_on = false;
    let duty = ctx.config.cooldown_fan_duty;
    let secs = ctx.config.cooldown_secs;
    ctx.commands.fan_duty_percent = duty;
    ctx.set_status(format_args!("Fan at {duty}% for {secs}s."), Some(secs));
    info!("COOLDOWN: fan {duty}% for {secs}s");
}

fn cooldown_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    let total = ctx.config.cooldown_secs;
    let duty = ctx.config.cooldown_fan_duty;
    let elapsed = ctx.secs_in_state();
    if elapsed >= total {
        return Some(StateId::SafetyWait);
    }
    let remaining = total - elapsed;
    ctx.set_status(format_args!("Fan {duty}%: {remaining}s left"), Some(remaining));
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAFETY_WAIT state: fan off, countdown before unlock
// ═══════════════════════════════════════════════════════════════════════════

fn safety_wait_enter(ctx: &mut FsmContext) {
    ctx.commands.heater_on = false;
    ctx.commands.fan_duty_percent = 0;
    let secs = ctx.config.safety_wait_secs;
    ctx.set_status(format_args!("Cooldown: safety timer."), Some(secs));
    info!("SAFETY_WAIT: {}s countdown", secs);
}

fn safety_wait_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    if let Some(celsius) = ctx.sensors.temperature.fresh()
        && celsius >= ctx.config.heater_cutoff_c
    {
        warn!("SAFETY_WAIT: {celsius:.1}°C, forcing heater off");
        ctx.commands.heater_on = false;
    }

    let total = ctx.config.safety_wait_secs;
    let elapsed = ctx.secs_in_state();
    if elapsed >= total {
        return Some(StateId::Unlocking);
    }
    let remaining = total - elapsed;
    ctx.set_status(
        format_args!(
            "Please wait: {:02}:{:02} remaining (Cooldown)",
            remaining / 60,
            remaining % 60
        ),
        Some(remaining),
    );
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  UNLOCKING state
// ═══════════════════════════════════════════════════════════════════════════

fn unlocking_enter(ctx: &mut FsmContext) {
    ctx.commands.heater_on = false;
    ctx.commands.door_locked = false;
    let settle = ctx.config.unlock_settle_secs;
    ctx.set_status(format_args!("Session complete. Unlocking door."), Some(settle));
    info!("UNLOCKING: door released");
}

fn unlocking_update(ctx: &mut FsmContext) -> Option<StateId> {
    if let Some(next) = fault_guard(ctx) {
        return Some(next);
    }
    if ctx.secs_in_state() >= ctx.config.unlock_settle_secs {
        ctx.set_status(format_args!("Done. Door unlocked."), None);
        ctx.finish(CycleOutcome::Completed);
        return Some(StateId::Idle);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAFE_MODE state: manual emergency override
// ═══════════════════════════════════════════════════════════════════════════

fn safe_mode_enter(ctx: &mut FsmContext) {
    ctx.commands = ActuatorState::SAFE;
    ctx.run = None;
    show_safe_mode_status(ctx);
    warn!("SAFE_MODE: heater off, door unlocked, fan off");
}

/// Status line shown while the safe state holds.
pub(crate) fn show_safe_mode_status(ctx: &mut FsmContext) {
    ctx.set_status(
        format_args!("SAFE MODE ACTIVATED. Heater disabled. Door unlocked. Fans turned off."),
        None,
    );
}

fn safe_mode_exit(_ctx: &mut FsmContext) {
    info!("SAFE_MODE: released by caller");
}

fn safe_mode_update(ctx: &mut FsmContext) -> Option<StateId> {
    // Hold the safe state; only an explicit exit leaves.
    ctx.commands = ActuatorState::SAFE;
    None
}
