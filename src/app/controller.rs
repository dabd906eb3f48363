//! Threaded runner for [`AppService`].
//!
//! [`CabinetController::spawn`] moves the hardware onto a dedicated
//! control-loop thread.  Callers talk to it only through the command and
//! event channels, a safe-mode flag checked at every tick boundary, and a
//! lock-free [`StatusBoard`].  Dropping the controller stops the loop and
//! drives the safe state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use log::{error, info};
use serde::Serialize;

use crate::config::CabinetConfig;
use crate::cycle::StartRequest;
use crate::error::{Error, Result};
use crate::fsm::StateId;
use crate::fsm::context::ActuatorState;

use super::channels::{ChannelSink, ControlChannels};
use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{ActuatorPort, SensorPort, Ticker};
use super::service::AppService;

// ───────────────────────────────────────────────────────────────
// Status board
// ───────────────────────────────────────────────────────────────

/// What the worker last published.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CabinetSnapshot {
    pub state: StateId,
    /// Outputs last confirmed written to the hardware.
    pub actuators: ActuatorState,
    /// `false` while a write is failing; `actuators` may then be out of date.
    pub actuators_confirmed: bool,
    pub fault_flags: u8,
    /// Chamber temperature, when the last reading is still fresh.
    pub temperature_c: Option<f32>,
}

/// Worker-written, caller-read copy of the cabinet state.
pub struct StatusBoard {
    state: AtomicU8,
    heater_on: AtomicBool,
    door_locked: AtomicBool,
    fan_duty: AtomicU8,
    confirmed: AtomicBool,
    faults: AtomicU8,
    /// `f32` bits; NaN when there is no fresh reading.
    temperature: AtomicU32,
}

impl StatusBoard {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(StateId::Idle as u8),
            heater_on: AtomicBool::new(false),
            door_locked: AtomicBool::new(false),
            fan_duty: AtomicU8::new(0),
            confirmed: AtomicBool::new(false),
            faults: AtomicU8::new(0),
            temperature: AtomicU32::new(f32::NAN.to_bits()),
        }
    }

    fn publish(&self, service: &AppService) {
        let applied = service.applied_actuators();
        if let Some(act) = applied {
            self.heater_on.store(act.heater_on, Ordering::Relaxed);
            self.door_locked.store(act.door_locked, Ordering::Relaxed);
            self.fan_duty.store(act.fan_duty_percent, Ordering::Relaxed);
        }
        self.confirmed.store(applied.is_some(), Ordering::Relaxed);
        self.faults.store(service.fault_flags(), Ordering::Relaxed);
        let temperature = service.fresh_temperature().unwrap_or(f32::NAN);
        self.temperature.store(temperature.to_bits(), Ordering::Relaxed);
        // Release pairs with the Acquire in `snapshot`.
        self.state.store(service.state() as u8, Ordering::Release);
    }

    pub fn snapshot(&self) -> CabinetSnapshot {
        let state = StateId::from_index(usize::from(self.state.load(Ordering::Acquire)));
        CabinetSnapshot {
            state,
            actuators: ActuatorState {
                heater_on: self.heater_on.load(Ordering::Relaxed),
                door_locked: self.door_locked.load(Ordering::Relaxed),
                fan_duty_percent: self.fan_duty.load(Ordering::Relaxed),
            },
            actuators_confirmed: self.confirmed.load(Ordering::Relaxed),
            fault_flags: self.faults.load(Ordering::Relaxed),
            temperature_c: Some(f32::from_bits(self.temperature.load(Ordering::Relaxed)))
                .filter(|t| !t.is_nan()),
        }
    }
}

struct Shared {
    safe_mode: AtomicBool,
    stop: AtomicBool,
    running: AtomicBool,
    board: StatusBoard,
}

// ───────────────────────────────────────────────────────────────
// Handle
// ───────────────────────────────────────────────────────────────

/// Clonable caller-side API.  Valid for as long as the controller lives.
#[derive(Clone)]
pub struct ControllerHandle {
    channels: Arc<ControlChannels>,
    shared: Arc<Shared>,
}

impl ControllerHandle {
    pub fn start_cycle(&self, request: StartRequest) -> Result<()> {
        self.send(AppCommand::StartCycle(request))
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(AppCommand::Cancel)
    }

    /// Raise the safe-mode flag.  The worker acts on it at the next tick
    /// boundary, ahead of any queued command.
    pub fn activate_safe_mode(&self) -> Result<()> {
        self.ensure_running()?;
        self.shared.safe_mode.store(true, Ordering::Release);
        Ok(())
    }

    pub fn exit_safe_mode(&self) -> Result<()> {
        self.send(AppCommand::ExitSafeMode)
    }

    pub fn arm_auto_start(&self, request: StartRequest) -> Result<()> {
        self.send(AppCommand::ArmAutoStart(request))
    }

    pub fn disarm_auto_start(&self) -> Result<()> {
        self.send(AppCommand::DisarmAutoStart)
    }

    /// Next event, if one is waiting.
    pub fn try_next_event(&self) -> Option<AppEvent> {
        self.channels.events.try_receive().ok()
    }

    /// Block until the worker emits an event.
    ///
    /// Only call this while the controller is alive; a stopped worker
    /// emits nothing further.
    pub fn next_event(&self) -> AppEvent {
        futures_lite::future::block_on(self.channels.events.receive())
    }

    pub fn snapshot(&self) -> CabinetSnapshot {
        self.shared.board.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::Disconnected)
        }
    }

    fn send(&self, cmd: AppCommand) -> Result<()> {
        self.ensure_running()?;
        self.channels
            .commands
            .try_send(cmd)
            .map_err(|_| Error::QueueFull)
    }
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

/// Owns the control-loop thread.
pub struct CabinetController {
    handle: ControllerHandle,
    worker: Option<JoinHandle<()>>,
}

impl CabinetController {
    /// Validate `config`, then start the control loop on its own thread.
    pub fn spawn<H, T>(config: CabinetConfig, hw: H, ticker: T) -> Result<Self>
    where
        H: SensorPort + ActuatorPort + Send + 'static,
        T: Ticker + Send + 'static,
    {
        config.validate()?;

        let channels = ControlChannels::shared();
        let shared = Arc::new(Shared {
            safe_mode: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(true),
            board: StatusBoard::new(),
        });

        let worker = {
            let channels = channels.clone();
            let shared = shared.clone();
            thread::Builder::new()
                .name("bakhoor-control".into())
                .spawn(move || control_loop(config, hw, ticker, &channels, &shared))
                .map_err(|e| {
                    error!("Failed to spawn control loop: {e}");
                    Error::Disconnected
                })?
        };

        Ok(Self {
            handle: ControllerHandle { channels, shared },
            worker: Some(worker),
        })
    }

    /// A clonable handle for other threads.
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it to drive the safe state.
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.handle.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("Control loop panicked");
        }
    }
}

impl core::ops::Deref for CabinetController {
    type Target = ControllerHandle;

    fn deref(&self) -> &ControllerHandle {
        &self.handle
    }
}

impl Drop for CabinetController {
    fn drop(&mut self) {
        self.join();
    }
}

fn control_loop<H, T>(
    config: CabinetConfig,
    mut hw: H,
    mut ticker: T,
    channels: &Arc<ControlChannels>,
    shared: &Shared,
) where
    H: SensorPort + ActuatorPort,
    T: Ticker,
{
    let mut sink = ChannelSink::new(channels.clone());
    let mut service = AppService::new(config);
    service.start(&mut hw, &mut sink);
    shared.board.publish(&service);
    info!("Control loop running");

    while !shared.stop.load(Ordering::Acquire) {
        ticker.wait();
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        // 1. Safe mode first: it must beat anything still queued.
        if shared.safe_mode.swap(false, Ordering::AcqRel) && service.state() != StateId::SafeMode {
            service.handle_command(AppCommand::ActivateSafeMode, &mut hw, &mut sink);
        }

        // 2. Caller commands
        while let Ok(cmd) = channels.commands.try_receive() {
            service.handle_command(cmd, &mut hw, &mut sink);
        }

        // 3. One second of control
        service.tick(&mut hw, &mut sink);
        shared.board.publish(&service);
    }

    if let Err(e) = service.shutdown(&mut hw) {
        error!("Safe state not fully applied on shutdown: {e}");
    }
    shared.board.publish(&service);
    shared.running.store(false, Ordering::Release);
    info!("Control loop stopped");
}
