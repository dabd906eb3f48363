//! Integration tests for the AppService → FSM → actuators pipeline.
//!
//! Every test drives the service in virtual time (one `tick` = one
//! second) against [`MockHardware`], so a full cycle runs in microseconds.

use crate::mock_hw::{ActuatorCall, MockHardware, RecordingSink};

use bakhoor::app::commands::AppCommand;
use bakhoor::app::events::AppEvent;
use bakhoor::app::service::AppService;
use bakhoor::config::CabinetConfig;
use bakhoor::cycle::{CustomSettings, HeatLevel, Mode, SpeedLevel, StartRequest};
use bakhoor::error::{Fault, SensorError};
use bakhoor::fsm::StateId;
use bakhoor::fsm::context::{AbortReason, Sample};

fn make_app(config: CabinetConfig) -> (AppService, MockHardware, RecordingSink) {
    let mut app = AppService::new(config);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.start(&mut hw, &mut sink);
    (app, hw, sink)
}

fn request(mode: Mode) -> StartRequest {
    StartRequest::new(mode, HeatLevel::Medium, SpeedLevel::Two)
}

fn start(app: &mut AppService, hw: &mut MockHardware, sink: &mut RecordingSink, mode: Mode) {
    app.handle_command(AppCommand::StartCycle(request(mode)), hw, sink);
}

fn tick_n(app: &mut AppService, hw: &mut MockHardware, sink: &mut RecordingSink, n: u32) {
    for _ in 0..n {
        app.tick(hw, sink);
    }
}

/// Tick until `done` holds; returns how many ticks it took.
fn run_until(
    app: &mut AppService,
    hw: &mut MockHardware,
    sink: &mut RecordingSink,
    max: u32,
    done: impl Fn(&AppService) -> bool,
) -> u32 {
    for n in 1..=max {
        app.tick(hw, sink);
        if done(app) {
            return n;
        }
    }
    panic!("condition not reached within {max} ticks (state {:?})", app.state());
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_drives_safe_state_in_order() {
    let (app, hw, sink) = make_app(CabinetConfig::default());
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(
        hw.calls,
        vec![
            ActuatorCall::Heater(false),
            ActuatorCall::FanDuty(0),
            ActuatorCall::DoorLocked(false),
        ]
    );
    assert_eq!(
        sink.events.first(),
        Some(&AppEvent::Started {
            state: StateId::Idle
        })
    );
}

// ── Person: full cycle with entry ─────────────────────────────

#[test]
fn person_cycle_end_to_end() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    hw.temperature = Ok(60.0);

    start(&mut app, &mut hw, &mut sink, Mode::Person);
    assert_eq!(app.state(), StateId::Preheating);
    assert!(hw.heater_on());
    assert!(hw.door_locked());
    assert_eq!(hw.fan_duty(), 10);

    let mut ticks = run_until(&mut app, &mut hw, &mut sink, 100, |a| {
        a.state() == StateId::AwaitingEntry
    });
    assert_eq!(ticks, 30, "door unlocks 30 s into preheat");
    assert!(!hw.door_locked());

    hw.weight = Ok(72.0);
    app.tick(&mut hw, &mut sink);
    ticks += 1;
    assert_eq!(app.state(), StateId::Preheating);
    assert!(app.run().is_some_and(|r| r.entry_confirmed));

    ticks += run_until(&mut app, &mut hw, &mut sink, 1000, |a| {
        a.state() == StateId::Idle
    });
    assert_eq!(ticks, 722, "240 s session + 180 s cooldown + 300 s wait + 2 s settle");

    let entered = sink.states_entered();
    assert_eq!(
        &entered[..4],
        &[
            StateId::Preheating,
            StateId::AwaitingEntry,
            StateId::Preheating,
            StateId::HeatingOn
        ]
    );
    assert!(entered.contains(&StateId::HeatingOff));
    assert!(entered.ends_with(&[
        StateId::Cooldown,
        StateId::SafetyWait,
        StateId::Unlocking,
        StateId::Idle
    ]));
    assert_eq!(sink.terminal(), vec![&AppEvent::CycleCompleted]);

    // Locked once for preheat, never re-locked after entry.
    let locks = hw
        .calls
        .iter()
        .filter(|c| **c == ActuatorCall::DoorLocked(true))
        .count();
    assert_eq!(locks, 1);
    assert!(!hw.heater_on());
    assert!(!hw.door_locked());
    assert_eq!(hw.fan_duty(), 0);
    assert_eq!(sink.last_status(), Some("Done. Door unlocked."));
}

#[test]
fn cooldown_runs_fan_at_full_duty() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    run_until(&mut app, &mut hw, &mut sink, 400, |a| {
        a.state() == StateId::Cooldown
    });
    assert!(!hw.heater_on());
    assert_eq!(hw.fan_duty(), 100);
    assert!(hw.door_locked());

    run_until(&mut app, &mut hw, &mut sink, 200, |a| {
        a.state() == StateId::SafetyWait
    });
    assert_eq!(hw.fan_duty(), 0);
    assert!(hw.door_locked(), "door stays locked through the safety wait");
}

// ── Overheat ──────────────────────────────────────────────────

#[test]
fn overheat_faults_cycle_and_blocks_restart() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    tick_n(&mut app, &mut hw, &mut sink, 5);

    hw.temperature = Ok(455.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.heater_on());
    assert_eq!(hw.fan_duty(), 0);
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleFaulted {
            reason: Fault::Overheat
        }]
    );
    assert!(
        sink.last_status()
            .is_some_and(|s| s.starts_with("Temperature exceeded 450"))
    );
    assert_ne!(app.fault_flags() & Fault::Overheat.mask(), 0);

    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(sink.rejections(), vec!["overheat fault latched"]);

    // Three fresh readings well below the limit clear the latch.
    hw.temperature = Ok(100.0);
    tick_n(&mut app, &mut hw, &mut sink, 5);
    assert_eq!(app.fault_flags(), 0);
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    assert_eq!(app.state(), StateId::Preheating);
}

#[test]
fn over_range_reading_still_trips_overheat() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    tick_n(&mut app, &mut hw, &mut sink, 3);

    hw.temperature = Ok(1100.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.last_samples().temperature, Sample::Fresh(1024.0));
    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.heater_on());
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleFaulted {
            reason: Fault::Overheat
        }]
    );
}

#[test]
fn overheat_holds_until_chamber_is_cool() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    app.tick(&mut hw, &mut sink);
    hw.temperature = Ok(460.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);

    // Just under the limit is still far too hot to start again.
    hw.temperature = Ok(449.0);
    tick_n(&mut app, &mut hw, &mut sink, 20);
    assert_ne!(app.fault_flags() & Fault::Overheat.mask(), 0);
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    assert_eq!(sink.rejections(), vec!["overheat fault latched"]);

    hw.temperature = Ok(140.0);
    tick_n(&mut app, &mut hw, &mut sink, 2);
    assert_ne!(app.fault_flags() & Fault::Overheat.mask(), 0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.fault_flags(), 0);
}

#[test]
fn cutoff_ends_on_phase_within_one_poll() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    hw.temperature = Ok(90.0);
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    run_until(&mut app, &mut hw, &mut sink, 200, |a| {
        a.state() == StateId::HeatingOn
    });
    assert!(hw.heater_on());

    hw.temperature = Ok(160.0);
    let n = run_until(&mut app, &mut hw, &mut sink, 10, |a| {
        a.state() == StateId::HeatingOff
    });
    assert!(n <= 5, "cut after {n} ticks");
    assert!(!hw.heater_on());
    assert!(sink.last_status().is_some_and(|s| s.contains(">150°C")));
    assert_eq!(app.fault_flags(), 0, "the cutoff is not a fault");
}

// ── Person entry gate ─────────────────────────────────────────

#[test]
fn light_occupant_disqualifies_cycle() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Person);
    run_until(&mut app, &mut hw, &mut sink, 100, |a| {
        a.state() == StateId::AwaitingEntry
    });

    hw.weight = Ok(30.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.heater_on());
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleAborted {
            reason: AbortReason::DisqualifiedOccupant
        }]
    );
}

#[test]
fn empty_chamber_pauses_preheat_until_adult_enters() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Person);
    run_until(&mut app, &mut hw, &mut sink, 100, |a| {
        a.state() == StateId::AwaitingEntry
    });

    tick_n(&mut app, &mut hw, &mut sink, 15);
    let run = *app.run().expect("cycle running");
    assert!(run.paused);
    assert!(!hw.heater_on());
    assert_eq!(sink.last_status(), Some("Heater paused. Please enter chamber."));

    // Clocks stay frozen, and a non-adult weight does not abort while paused.
    hw.weight = Ok(20.0);
    tick_n(&mut app, &mut hw, &mut sink, 5);
    let frozen = *app.run().expect("cycle running");
    assert_eq!(frozen.preheat_elapsed, run.preheat_elapsed);
    assert_eq!(frozen.cycle_elapsed, run.cycle_elapsed);
    assert_eq!(app.state(), StateId::AwaitingEntry);

    hw.weight = Ok(80.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Preheating);
    assert!(hw.heater_on());
    assert!(!hw.door_locked());
}

#[test]
fn silent_load_cell_pauses_preheat() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Person);
    run_until(&mut app, &mut hw, &mut sink, 100, |a| {
        a.state() == StateId::AwaitingEntry
    });

    hw.weight = Err(SensorError::Timeout);
    tick_n(&mut app, &mut hw, &mut sink, 15);
    assert_eq!(app.last_samples().weight, Sample::Unknown);
    assert!(app.run().expect("cycle running").paused);
    assert!(!hw.heater_on());

    // The heater stays off for as long as the weight cannot be read.
    tick_n(&mut app, &mut hw, &mut sink, 600);
    assert_eq!(app.state(), StateId::AwaitingEntry);
    assert!(app.run().expect("cycle running").paused);
    assert!(!hw.heater_on());
    assert!(sink.terminal().is_empty());

    hw.weight = Ok(75.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Preheating);
    assert!(hw.heater_on());
}

// ── Clothes: chamber must be empty before locking ─────────────

#[test]
fn clothes_waits_for_empty_chamber() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    hw.weight = Ok(20.0);
    start(&mut app, &mut hw, &mut sink, Mode::Clothes);
    assert_eq!(app.state(), StateId::ClearingChamber);

    tick_n(&mut app, &mut hw, &mut sink, 3);
    assert_eq!(app.state(), StateId::ClearingChamber);
    assert!(!hw.heater_on());
    assert!(!hw.door_locked());
    assert!(
        sink.last_status()
            .is_some_and(|s| s.starts_with("Weight detected"))
    );

    hw.weight = Ok(2.0);
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Preheating);
    assert!(hw.heater_on());
    assert!(hw.door_locked());
    assert_eq!(hw.fan_duty(), 10);
}

// ── Custom: thermostat ────────────────────────────────────────

#[test]
fn custom_cycle_follows_thermostat_band() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    let settings = CustomSettings::new(1, 10).expect("valid settings");
    hw.temperature = Ok(65.0);
    app.handle_command(
        AppCommand::StartCycle(StartRequest::custom(settings)),
        &mut hw,
        &mut sink,
    );
    // 65 °C is already above the band floor of 60 °C.
    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::HeatingOn);
    assert!(hw.heater_on());

    hw.temperature = Ok(90.0);
    run_until(&mut app, &mut hw, &mut sink, 6, |a| {
        a.state() == StateId::HeatingOff
    });
    assert!(!hw.heater_on());

    hw.temperature = Ok(50.0);
    run_until(&mut app, &mut hw, &mut sink, 6, |a| {
        a.state() == StateId::HeatingOn
    });
    assert!(hw.heater_on());
}

#[test]
fn invalid_custom_request_is_rejected() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    // Custom without settings.
    app.handle_command(
        AppCommand::StartCycle(request(Mode::Custom)),
        &mut hw,
        &mut sink,
    );
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(sink.rejections(), vec!["invalid cycle parameters"]);
}

// ── Actuation ─────────────────────────────────────────────────

#[test]
fn start_writes_heater_then_fan_then_door() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    hw.calls.clear();
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    assert_eq!(
        hw.calls,
        vec![
            ActuatorCall::Heater(true),
            ActuatorCall::FanDuty(10),
            ActuatorCall::DoorLocked(true),
        ]
    );
}

#[test]
fn unchanged_outputs_are_not_rewritten() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    hw.calls.clear();
    tick_n(&mut app, &mut hw, &mut sink, 10);
    assert!(hw.calls.is_empty(), "unexpected writes: {:?}", hw.calls);
    assert_eq!(hw.temperature_reads, 10, "temperature polled every preheat tick");
}

#[test]
fn single_write_failure_is_retried() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    hw.calls.clear();
    hw.fail_writes = 1;
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    assert_eq!(app.state(), StateId::Preheating);
    assert_eq!(app.fault_flags(), 0);
    assert_eq!(hw.calls[0], ActuatorCall::Heater(true));
    assert!(sink.terminal().is_empty());
}

#[test]
fn repeated_write_failure_faults_to_safe_state() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    hw.fail_writes = 2;
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);

    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleFaulted {
            reason: Fault::ActuatorWriteFailure
        }]
    );
    assert_ne!(app.fault_flags() & Fault::ActuatorWriteFailure.mask(), 0);
    assert!(!hw.heater_on());
    assert!(!hw.door_locked());
    assert_eq!(hw.fan_duty(), 0);

    // The next accepted start clears the latch.
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    assert_eq!(app.state(), StateId::Preheating);
    assert_eq!(app.fault_flags(), 0);
}

// ── Sensors ───────────────────────────────────────────────────

#[test]
fn failed_temperature_read_is_retried_then_unknown() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    app.tick(&mut hw, &mut sink);
    let before = hw.temperature_reads;

    hw.temperature = Err(SensorError::Timeout);
    app.tick(&mut hw, &mut sink);
    assert_eq!(hw.temperature_reads, before + 2);
    assert_eq!(app.last_samples().temperature, Sample::Unknown);
    assert_eq!(app.state(), StateId::Preheating);

    // The last good value is kept, with its age.
    let last = app.last_temperature().expect("earlier reading");
    assert_eq!(last.value, 25.0);
    assert_eq!(last.age_secs, 1);
}

// ── Cancel ────────────────────────────────────────────────────

#[test]
fn cancel_stops_heater_and_leaves_door() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    tick_n(&mut app, &mut hw, &mut sink, 3);

    app.handle_command(AppCommand::Cancel, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);
    assert!(!hw.heater_on());
    assert!(hw.door_locked(), "cancel does not unlock the door");
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleAborted {
            reason: AbortReason::Cancelled
        }]
    );
    assert_eq!(sink.last_status(), Some("Cycle cancelled. Heater OFF."));

    app.handle_command(AppCommand::Cancel, &mut hw, &mut sink);
    assert_eq!(sink.rejections(), vec!["no cycle to cancel"]);
}

#[test]
fn start_is_rejected_mid_cycle() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    start(&mut app, &mut hw, &mut sink, Mode::Surrounding);
    start(&mut app, &mut hw, &mut sink, Mode::Person);
    assert_eq!(sink.rejections(), vec!["a cycle can only start from idle"]);
    assert_eq!(app.run().map(|r| r.request.mode), Some(Mode::Surrounding));
}

// ── Auto-start ────────────────────────────────────────────────

fn auto_start_config() -> CabinetConfig {
    CabinetConfig {
        auto_start_enabled: true,
        ..CabinetConfig::default()
    }
}

#[test]
fn auto_start_fires_on_sustained_weight() {
    let (mut app, mut hw, mut sink) = make_app(auto_start_config());
    app.handle_command(
        AppCommand::ArmAutoStart(request(Mode::Surrounding)),
        &mut hw,
        &mut sink,
    );
    assert!(app.auto_start_armed());

    hw.weight = Ok(6.0);
    tick_n(&mut app, &mut hw, &mut sink, 9);
    assert_eq!(app.state(), StateId::Idle);

    app.tick(&mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Preheating);
    assert!(!app.auto_start_armed());
    assert!(hw.heater_on());
}

#[test]
fn light_load_never_auto_starts() {
    let (mut app, mut hw, mut sink) = make_app(auto_start_config());
    app.handle_command(
        AppCommand::ArmAutoStart(request(Mode::Surrounding)),
        &mut hw,
        &mut sink,
    );
    hw.weight = Ok(3.0);
    tick_n(&mut app, &mut hw, &mut sink, 60);
    assert_eq!(app.state(), StateId::Idle);
    assert!(app.auto_start_armed());

    app.handle_command(AppCommand::DisarmAutoStart, &mut hw, &mut sink);
    assert!(!app.auto_start_armed());
}

#[test]
fn auto_start_requires_opt_in() {
    let (mut app, mut hw, mut sink) = make_app(CabinetConfig::default());
    app.handle_command(
        AppCommand::ArmAutoStart(request(Mode::Surrounding)),
        &mut hw,
        &mut sink,
    );
    assert!(!app.auto_start_armed());
    assert_eq!(sink.rejections(), vec!["auto-start disabled"]);
}
