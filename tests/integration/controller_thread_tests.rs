//! The control loop on its own thread, driven through a `ControllerHandle`
//! against the simulated cabinet with a 1 ms tick.

use std::time::{Duration, Instant};

use bakhoor::adapters::simulated::{SimHandle, SimTicker, SimulatedController};
use bakhoor::adapters::time::SleepTicker;
use bakhoor::app::events::AppEvent;
use bakhoor::error::{Error, Fault};
use bakhoor::fsm::StateId;
use bakhoor::{
    CabinetConfig, CabinetController, CabinetSnapshot, ControllerHandle, HeatLevel, Mode, SpeedLevel, StartRequest,
};

fn spawn() -> (CabinetController, SimHandle) {
    let config = CabinetConfig {
        control_loop_interval_ms: 1,
        ..CabinetConfig::default()
    };
    let sim = SimulatedController::new();
    let handle = sim.handle();
    let ticker = SimTicker::new(SleepTicker::from_millis(1), handle.clone());
    let controller = CabinetController::spawn(config, sim, ticker).expect("spawn");
    (controller, handle)
}

/// Drain events until `want` matches or five seconds pass.
fn wait_for(ctl: &ControllerHandle, want: impl Fn(&AppEvent) -> bool) -> AppEvent {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match ctl.try_next_event() {
            Some(event) if want(&event) => return event,
            Some(_) => {}
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    panic!("event not seen within 5 s");
}

#[test]
fn start_runs_on_the_control_thread() {
    let (ctl, sim) = spawn();
    wait_for(&ctl, |e| matches!(e, AppEvent::Started { .. }));
    assert!(!sim.door_locked());

    let req = StartRequest::new(Mode::Surrounding, HeatLevel::Medium, SpeedLevel::Two);
    ctl.start_cycle(req).expect("queued");
    wait_for(&ctl, |e| {
        *e == AppEvent::StateChanged {
            from: StateId::Idle,
            to: StateId::Preheating,
        }
    });
    assert!(sim.heater_on());
    assert!(sim.door_locked());

    // The board is published after each tick.
    let deadline = Instant::now() + Duration::from_secs(5);
    while ctl.snapshot().state != StateId::Preheating && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    let snap = ctl.snapshot();
    assert_eq!(snap.state, StateId::Preheating);
    assert!(snap.actuators.heater_on);
    assert!(snap.actuators_confirmed);
    assert!(snap.temperature_c.is_some());
}

fn wait_for_snapshot(ctl: &ControllerHandle, want: impl Fn(&CabinetSnapshot) -> bool) -> CabinetSnapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        let snap = ctl.snapshot();
        if want(&snap) {
            return snap;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    panic!("snapshot not seen within 5 s");
}

#[test]
fn board_shows_outputs_actually_applied() {
    let (ctl, sim) = spawn();
    let req = StartRequest::new(Mode::Surrounding, HeatLevel::High, SpeedLevel::Two);
    ctl.start_cycle(req).expect("queued");
    wait_for_snapshot(&ctl, |s| s.actuators.door_locked);

    sim.fail_actuator_writes(u32::MAX);
    ctl.activate_safe_mode().expect("flagged");
    wait_for(&ctl, |e| {
        *e == AppEvent::CycleFaulted {
            reason: Fault::ActuatorWriteFailure,
        }
    });
    let snap = wait_for_snapshot(&ctl, |s| s.state == StateId::SafeMode);
    assert!(!snap.actuators_confirmed);
    // Safe mode wants the door unlocked, but the unlock never reached it.
    assert!(sim.door_locked());
    assert!(snap.actuators.door_locked, "last confirmed output, not the wanted one");

    sim.fail_actuator_writes(0);
    wait_for(&ctl, |e| *e == AppEvent::SafeModeEngaged);
    let snap = wait_for_snapshot(&ctl, |s| s.actuators_confirmed);
    assert!(!snap.actuators.door_locked);
    assert!(!snap.actuators.heater_on);
    assert!(!sim.door_locked());
}

#[test]
fn safe_mode_beats_queued_commands() {
    let (ctl, sim) = spawn();
    let req = StartRequest::new(Mode::Surrounding, HeatLevel::High, SpeedLevel::Three);
    ctl.start_cycle(req).expect("queued");
    wait_for(&ctl, |e| {
        matches!(
            e,
            AppEvent::StateChanged {
                to: StateId::Preheating,
                ..
            }
        )
    });

    ctl.activate_safe_mode().expect("flagged");
    wait_for(&ctl, |e| *e == AppEvent::SafeModeEngaged);
    assert!(!sim.heater_on());
    assert!(!sim.door_locked());
    assert_eq!(sim.fan_duty(), 0);

    ctl.exit_safe_mode().expect("queued");
    wait_for(&ctl, |e| *e == AppEvent::SafeModeExited);
}

#[test]
fn stopped_controller_refuses_commands() {
    let (ctl, sim) = spawn();
    let handle = ctl.handle();
    let req = StartRequest::new(Mode::Surrounding, HeatLevel::Low, SpeedLevel::One);
    handle.start_cycle(req).expect("queued");
    wait_for(&handle, |e| {
        matches!(
            e,
            AppEvent::StateChanged {
                to: StateId::Preheating,
                ..
            }
        )
    });

    ctl.stop();
    assert!(!handle.is_running());
    assert!(!sim.heater_on(), "shutdown drives the safe state");
    assert!(!sim.door_locked());
    assert_eq!(handle.start_cycle(req), Err(Error::Disconnected));
}
