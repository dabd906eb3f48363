//! Safe mode: engage from any state, hold, and release only on request.

use crate::mock_hw::{ActuatorCall, MockHardware, RecordingSink};

use bakhoor::app::commands::AppCommand;
use bakhoor::app::events::AppEvent;
use bakhoor::app::service::AppService;
use bakhoor::config::CabinetConfig;
use bakhoor::cycle::{HeatLevel, Mode, SpeedLevel, StartRequest};
use bakhoor::error::Fault;
use bakhoor::fsm::StateId;
use bakhoor::fsm::context::{AbortReason, ActuatorState};

fn running_cycle() -> (AppService, MockHardware, RecordingSink) {
    let mut app = AppService::new(CabinetConfig::default());
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.start(&mut hw, &mut sink);
    let req = StartRequest::new(Mode::Surrounding, HeatLevel::High, SpeedLevel::One);
    app.handle_command(AppCommand::StartCycle(req), &mut hw, &mut sink);
    for _ in 0..120 {
        app.tick(&mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::HeatingOn);
    (app, hw, sink)
}

fn tick_n(app: &mut AppService, hw: &mut MockHardware, sink: &mut RecordingSink, n: u32) {
    for _ in 0..n {
        app.tick(hw, sink);
    }
}

#[test]
fn safe_mode_writes_all_three_outputs_before_reporting() {
    let (mut app, mut hw, mut sink) = running_cycle();
    hw.calls.clear();
    sink.events.clear();

    app.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::SafeMode);
    assert_eq!(
        hw.calls,
        vec![
            ActuatorCall::Heater(false),
            ActuatorCall::FanDuty(0),
            ActuatorCall::DoorLocked(false),
        ]
    );
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleAborted {
            reason: AbortReason::SafeMode
        }]
    );
    assert_eq!(sink.events.last(), Some(&AppEvent::SafeModeEngaged));
    assert!(app.run().is_none());
}

#[test]
fn safe_mode_is_not_reported_until_outputs_are_written() {
    let (mut app, mut hw, mut sink) = running_cycle();
    hw.calls.clear();
    sink.events.clear();

    hw.fail_writes = 100;
    app.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::SafeMode);
    assert!(app.safe_state_pending());
    assert!(hw.calls.is_empty());
    assert!(!sink.events.contains(&AppEvent::SafeModeEngaged));
    assert_eq!(
        sink.terminal(),
        vec![&AppEvent::CycleFaulted {
            reason: Fault::ActuatorWriteFailure
        }]
    );
    assert_ne!(app.fault_flags() & Fault::ActuatorWriteFailure.mask(), 0);
    assert_eq!(app.applied_actuators(), None);

    // Retried every tick while the outputs keep failing.
    let attempts = hw.write_attempts;
    tick_n(&mut app, &mut hw, &mut sink, 3);
    assert!(hw.write_attempts > attempts);
    assert!(!sink.events.contains(&AppEvent::SafeModeEngaged));

    hw.fail_writes = 0;
    app.tick(&mut hw, &mut sink);
    assert_eq!(
        hw.calls,
        vec![
            ActuatorCall::Heater(false),
            ActuatorCall::FanDuty(0),
            ActuatorCall::DoorLocked(false),
        ]
    );
    assert_eq!(sink.events.last(), Some(&AppEvent::SafeModeEngaged));
    assert!(!app.safe_state_pending());
    assert_eq!(app.applied_actuators(), Some(ActuatorState::SAFE));
}

#[test]
fn safe_mode_holds_until_exit() {
    let (mut app, mut hw, mut sink) = running_cycle();
    app.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);
    hw.calls.clear();

    hw.temperature = Ok(200.0);
    for _ in 0..600 {
        app.tick(&mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::SafeMode);
    assert!(hw.calls.is_empty(), "safe state already applied");

    let req = StartRequest::new(Mode::Person, HeatLevel::Low, SpeedLevel::One);
    app.handle_command(AppCommand::StartCycle(req), &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::SafeMode);

    app.handle_command(AppCommand::ExitSafeMode, &mut hw, &mut sink);
    assert_eq!(app.state(), StateId::Idle);
    assert_eq!(sink.events.last(), Some(&AppEvent::SafeModeExited));
    assert!(!hw.heater_on());
}

#[test]
fn safe_mode_from_idle_and_repeat_requests() {
    let mut app = AppService::new(CabinetConfig::default());
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.start(&mut hw, &mut sink);

    app.handle_command(AppCommand::ExitSafeMode, &mut hw, &mut sink);
    app.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);
    assert!(sink.terminal().is_empty(), "no cycle was running");
    app.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);

    assert_eq!(app.state(), StateId::SafeMode);
    assert_eq!(
        sink.rejections(),
        vec!["not in safe mode", "already in safe mode"]
    );
}

#[test]
fn safe_mode_disarms_auto_start() {
    let config = CabinetConfig {
        auto_start_enabled: true,
        ..CabinetConfig::default()
    };
    let mut app = AppService::new(config);
    let mut hw = MockHardware::new();
    let mut sink = RecordingSink::new();
    app.start(&mut hw, &mut sink);

    let req = StartRequest::new(Mode::Surrounding, HeatLevel::Medium, SpeedLevel::Two);
    app.handle_command(AppCommand::ArmAutoStart(req), &mut hw, &mut sink);
    app.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);
    app.handle_command(AppCommand::ExitSafeMode, &mut hw, &mut sink);
    assert!(!app.auto_start_armed());

    hw.weight = Ok(20.0);
    for _ in 0..30 {
        app.tick(&mut hw, &mut sink);
    }
    assert_eq!(app.state(), StateId::Idle);
}
