//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, safety supervisor, sensor hub and shared
//! context.  It exposes a clean, hardware-agnostic API.  All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters and virtual time (one `tick` = one second).
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                 │        AppService         │
//! ActuatorPort ◀──│  FSM · Safety · Sensors   │
//!                 └──────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use heapless::Deque;
use log::{error, info, warn};

use crate::config::{CabinetConfig, MAX_AUTO_START_WINDOW};
use crate::cycle::{CycleParameters, ModePolicy, StartRequest};
use crate::error::{ActuatorError, Fault};
use crate::fsm::context::{
    AbortReason, ActuatorState, CycleOutcome, CycleRun, FsmContext, Sample, SensorSnapshot,
    StatusLine,
};
use crate::fsm::states::{build_state_table, show_safe_mode_status};
use crate::fsm::{CycleState, Fsm, StateId};
use crate::safety::SafetySupervisor;
use crate::sensors::{SensorHub, SensorReading};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{ActuatorPort, EventSink, SensorPort};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    safety: SafetySupervisor,
    sensors: SensorHub,
    /// What the hardware was last successfully told.  `None` forces a
    /// full rewrite on the next apply.
    applied: Option<ActuatorState>,
    /// Safe mode was requested but the safe state is not yet confirmed
    /// on the hardware.  Retried every tick.
    safe_state_pending: bool,
    /// Request to start when something is placed in the chamber.
    auto_start: Option<StartRequest>,
    weight_window: Deque<f32, MAX_AUTO_START_WINDOW>,
    /// Last status published to the sink.
    last_status: StatusLine,
    tick_count: u64,
    last_temp_poll: Option<u64>,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: CabinetConfig) -> Self {
        let safety = SafetySupervisor::new(&config);
        let sensors = SensorHub::new(&config);
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::Idle);

        Self {
            fsm,
            ctx,
            safety,
            sensors,
            applied: None,
            safe_state_pending: false,
            auto_start: None,
            weight_window: Deque::new(),
            last_status: StatusLine::default(),
            tick_count: 0,
            last_temp_poll: None,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start the FSM in Idle and drive the boot safe state.
    pub fn start(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        self.fsm.start(&mut self.ctx);
        self.ctx.commands = ActuatorState::SAFE;
        self.applied = None;
        self.apply_actuators(hw);
        sink.emit(&AppEvent::Started {
            state: self.fsm.current_state(),
        });
        info!("AppService started in {:?}", self.fsm.current_state());
    }

    /// Drive the safe state on the way out.  Every write is attempted even
    /// if an earlier one fails; the first error is returned.
    pub fn shutdown(&mut self, hw: &mut impl ActuatorPort) -> Result<(), ActuatorError> {
        self.ctx.commands = ActuatorState::SAFE;
        let result = write_safe_state(hw);
        self.applied = result.is_ok().then_some(ActuatorState::SAFE);
        info!("AppService shut down in {:?}", self.fsm.current_state());
        result
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one second of the control loop: read sensors → safety →
    /// auto-start → FSM → actuators → events.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`]. This avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(&mut self, hw: &mut (impl SensorPort + ActuatorPort), sink: &mut impl EventSink) {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();

        // 1. Read the sensors that are due in this state
        self.ctx.sensors = self.poll_sensors(hw, prev_state);

        // 2. Safety evaluation
        let faults = self.safety.evaluate(&self.ctx.sensors);
        self.ctx.fault_flags = faults;

        // 3. Auto-start replaces this tick's FSM update
        if prev_state == StateId::Idle
            && let Some(request) = self.auto_start_due()
        {
            info!("Auto-start: chamber loaded, starting {:?}", request.mode);
            self.begin_cycle(request, hw, sink);
            return;
        }

        // 4. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);

        // 5. Apply actuator commands via ActuatorPort
        let confirmed_safe = if self.safe_state_pending {
            self.retry_safe_state(hw)
        } else {
            self.apply_actuators(hw);
            false
        };

        // 6. Emit whatever changed
        self.publish(prev_state, sink);
        if confirmed_safe {
            sink.emit(&AppEvent::SafeModeEngaged);
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process a caller command.  Refusals are reported as
    /// [`AppEvent::CommandRejected`].
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        match cmd {
            AppCommand::StartCycle(request) => self.begin_cycle(request, hw, sink),
            AppCommand::Cancel => self.cancel(hw, sink),
            AppCommand::ActivateSafeMode => self.engage_safe_mode(hw, sink),
            AppCommand::ExitSafeMode => {
                let prev = self.fsm.current_state();
                if prev != StateId::SafeMode {
                    reject(sink, "not in safe mode");
                    return;
                }
                self.safe_state_pending = false;
                self.fsm.force_transition(StateId::Idle, &mut self.ctx);
                self.apply_actuators(hw);
                self.publish(prev, sink);
                sink.emit(&AppEvent::SafeModeExited);
            }
            AppCommand::ArmAutoStart(request) => {
                if !self.ctx.config.auto_start_enabled {
                    reject(sink, "auto-start disabled");
                } else if self.fsm.current_state() != StateId::Idle {
                    reject(sink, "auto-start can only be armed while idle");
                } else if let Err(e) = request.parameters() {
                    warn!("Auto-start request refused: {e}");
                    reject(sink, "invalid cycle parameters");
                } else {
                    info!("Auto-start armed for {:?}", request.mode);
                    self.auto_start = Some(request);
                    self.weight_window.clear();
                }
            }
            AppCommand::DisarmAutoStart => self.disarm_auto_start(),
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Caller-facing view of the current state.
    pub fn cycle_state(&self) -> CycleState {
        self.fsm.current_state().cycle_state()
    }

    /// Actuator state the handlers currently want.
    pub fn actuators(&self) -> ActuatorState {
        self.ctx.commands
    }

    /// Actuator state last confirmed on the hardware.  `None` after a
    /// write failed and before a full rewrite succeeded.
    pub fn applied_actuators(&self) -> Option<ActuatorState> {
        self.applied
    }

    /// `true` while safe mode is engaged but its writes have not all
    /// succeeded yet.
    pub fn safe_state_pending(&self) -> bool {
        self.safe_state_pending
    }

    /// The running cycle, if any.
    pub fn run(&self) -> Option<&CycleRun> {
        self.ctx.run.as_ref()
    }

    /// Parameters of the running cycle, if any.
    pub fn parameters(&self) -> Option<CycleParameters> {
        self.ctx.run.map(|r| r.params)
    }

    pub fn status(&self) -> &StatusLine {
        &self.ctx.status
    }

    pub fn last_temperature(&self) -> Option<SensorReading> {
        self.sensors.last_temperature(self.tick_count)
    }

    pub fn last_weight(&self) -> Option<SensorReading> {
        self.sensors.last_weight(self.tick_count)
    }

    /// Last temperature, if it is recent enough to display.
    pub fn fresh_temperature(&self) -> Option<f32> {
        self.sensors.fresh_temperature(self.tick_count)
    }

    /// Samples used by the most recent tick.
    pub fn last_samples(&self) -> SensorSnapshot {
        self.ctx.sensors
    }

    pub fn auto_start_armed(&self) -> bool {
        self.auto_start.is_some()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current latched fault bitmask (0 = no faults).
    pub fn fault_flags(&self) -> u8 {
        self.safety.faults()
    }

    pub fn config(&self) -> &CabinetConfig {
        &self.ctx.config
    }

    // ── Internal: commands ────────────────────────────────────

    fn begin_cycle(
        &mut self,
        request: StartRequest,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        let prev = self.fsm.current_state();
        if prev != StateId::Idle {
            reject(sink, "a cycle can only start from idle");
            return;
        }
        if self.safety.has_fault(Fault::Overheat) {
            warn!("Start refused: overheat still latched");
            reject(sink, "overheat fault latched");
            return;
        }
        let params = match request.parameters() {
            Ok(p) => p,
            Err(e) => {
                warn!("Start refused: {e}");
                reject(sink, "invalid cycle parameters");
                return;
            }
        };
        let policy = ModePolicy::for_mode(request.mode, &self.ctx.config)
            .with_speed_timer_start(request.speed_timer_start);

        self.safety.clear(Fault::ActuatorWriteFailure);
        self.ctx.fault_flags = self.safety.faults();
        self.ctx.run = Some(CycleRun::new(request, params, policy));
        self.ctx.outcome = None;
        self.auto_start = None;
        self.weight_window.clear();
        self.last_temp_poll = None;

        let first = if policy.chamber_clear_check {
            StateId::ClearingChamber
        } else {
            StateId::Preheating
        };
        info!(
            "Cycle start: {:?} heat={:?} speed={:?} preheat={}s total={}s",
            request.mode,
            request.heat,
            request.speed,
            params.preheat_seconds,
            params.total_cycle_seconds
        );
        self.fsm.force_transition(first, &mut self.ctx);
        self.apply_actuators(hw);
        self.publish(prev, sink);
    }

    fn cancel(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let prev = self.fsm.current_state();
        if prev.is_cycle_active() {
            info!("Cycle cancelled in {prev:?}");
            self.ctx.commands.heater_on = false;
            self.ctx.set_status(format_args!("Cycle cancelled. Heater OFF."), None);
            self.ctx.finish(CycleOutcome::Aborted(AbortReason::Cancelled));
            self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            self.apply_actuators(hw);
            self.publish(prev, sink);
        } else if self.auto_start.is_some() {
            self.disarm_auto_start();
        } else {
            reject(sink, "no cycle to cancel");
        }
    }

    /// Safe mode is reported only once heater, fan and door writes have
    /// all succeeded.  Until then the cycle is faulted and the writes are
    /// retried every tick.
    fn engage_safe_mode(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let prev = self.fsm.current_state();
        if prev == StateId::SafeMode {
            reject(sink, "already in safe mode");
            return;
        }
        self.auto_start = None;
        self.weight_window.clear();
        self.fsm.force_transition(StateId::SafeMode, &mut self.ctx);
        self.ctx.commands = ActuatorState::SAFE;

        // All three outputs are rewritten, whatever was applied before.
        match write_safe_state(hw) {
            Ok(()) => {
                self.applied = Some(ActuatorState::SAFE);
                self.safe_state_pending = false;
                if prev.is_cycle_active() {
                    self.ctx.finish(CycleOutcome::Aborted(AbortReason::SafeMode));
                }
                self.publish(prev, sink);
                sink.emit(&AppEvent::SafeModeEngaged);
            }
            Err(e) => {
                error!("Safe mode not confirmed ({e}); retrying every tick");
                self.applied = None;
                self.safe_state_pending = true;
                self.safety.latch(Fault::ActuatorWriteFailure);
                self.ctx.fault_flags = self.safety.faults();
                self.ctx.finish(CycleOutcome::Faulted(Fault::ActuatorWriteFailure));
                self.ctx.set_status(
                    format_args!("Actuator failure. Safe state not confirmed, retrying."),
                    None,
                );
                self.publish(prev, sink);
            }
        }
    }

    /// Returns `true` once the safe state is confirmed.
    fn retry_safe_state(&mut self, hw: &mut impl ActuatorPort) -> bool {
        if write_safe_state(hw).is_err() {
            return false;
        }
        info!("Safe state confirmed");
        self.applied = Some(ActuatorState::SAFE);
        self.safe_state_pending = false;
        show_safe_mode_status(&mut self.ctx);
        true
    }

    fn disarm_auto_start(&mut self) {
        if self.auto_start.take().is_some() {
            info!("Auto-start disarmed");
        }
        self.weight_window.clear();
    }

    // ── Internal: sensing ─────────────────────────────────────

    fn poll_sensors(&mut self, hw: &mut impl SensorPort, state: StateId) -> SensorSnapshot {
        let now = self.tick_count;
        let poll_every = u64::from(self.ctx.config.heating_temp_poll_secs.max(1));

        // A latched overheat is watched every tick until it clears.
        let temp_due = self.safety.has_fault(Fault::Overheat)
            || match state {
                StateId::ClearingChamber | StateId::Preheating | StateId::AwaitingEntry => true,
                _ => self
                    .last_temp_poll
                    .is_none_or(|last| now.saturating_sub(last) >= poll_every),
            };
        let weight_due = match state {
            StateId::ClearingChamber | StateId::AwaitingEntry => true,
            StateId::Idle => self.auto_start.is_some(),
            _ => false,
        };

        if temp_due || weight_due {
            let budget = Duration::from_millis(u64::from(self.ctx.config.sensor_timeout_ms));
            hw.set_read_deadline(Some(Instant::now() + budget));
        }
        let temperature = if temp_due {
            self.last_temp_poll = Some(now);
            self.sensors.poll_temperature(hw, now)
        } else {
            Sample::Skipped
        };
        let weight = if weight_due {
            self.sensors.poll_weight(hw, now)
        } else {
            Sample::Skipped
        };
        if temp_due || weight_due {
            hw.set_read_deadline(None);
        }

        SensorSnapshot {
            temperature,
            weight,
        }
    }

    /// Feed this tick's weight into the auto-start window and return the
    /// armed request once the window mean passes the threshold.
    fn auto_start_due(&mut self) -> Option<StartRequest> {
        let request = self.auto_start?;
        let Sample::Fresh(kg) = self.ctx.sensors.weight else {
            return None;
        };
        let window = (self.ctx.config.auto_start_window_secs as usize).clamp(1, MAX_AUTO_START_WINDOW);
        while self.weight_window.len() >= window {
            self.weight_window.pop_front();
        }
        // Cannot fail: the loop above leaves room.
        let _ = self.weight_window.push_back(kg);
        if self.weight_window.len() < window {
            return None;
        }
        let mean = self.weight_window.iter().sum::<f32>() / window as f32;
        (mean > self.ctx.config.auto_start_weight_kg).then_some(request)
    }

    // ── Internal: actuation ───────────────────────────────────

    /// Write the fields that changed, heater first.  A field that fails
    /// twice becomes an `ActuatorWriteFailure`.
    fn apply_actuators(&mut self, hw: &mut impl ActuatorPort) {
        let want = self.ctx.commands;
        match write_changes(hw, self.applied, want) {
            Ok(()) => self.applied = Some(want),
            Err(e) => self.actuator_failure(e, hw),
        }
    }

    fn actuator_failure(&mut self, err: ActuatorError, hw: &mut impl ActuatorPort) {
        error!("Actuator write failed twice ({err}); driving safe state");
        self.safety.latch(Fault::ActuatorWriteFailure);
        self.ctx.fault_flags = self.safety.faults();

        if self.fsm.current_state().is_cycle_active() {
            self.ctx.finish(CycleOutcome::Faulted(Fault::ActuatorWriteFailure));
            self.ctx.set_status(
                format_args!("Actuator failure. Heater OFF, door unlocked."),
                None,
            );
            self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        }
        self.ctx.commands = ActuatorState::SAFE;
        self.applied = write_safe_state(hw).is_ok().then_some(ActuatorState::SAFE);
    }

    // ── Internal: events ──────────────────────────────────────

    fn publish(&mut self, prev: StateId, sink: &mut impl EventSink) {
        let state = self.fsm.current_state();
        if state != prev {
            sink.emit(&AppEvent::StateChanged {
                from: prev,
                to: state,
            });
        }

        if let Some(outcome) = self.ctx.outcome.take() {
            let event = match outcome {
                CycleOutcome::Completed => AppEvent::CycleCompleted,
                CycleOutcome::Faulted(reason) => AppEvent::CycleFaulted { reason },
                CycleOutcome::Aborted(reason) => AppEvent::CycleAborted { reason },
            };
            info!("Cycle ended: {event:?}");
            sink.emit(&event);
        }

        if self.ctx.status != self.last_status {
            self.last_status = self.ctx.status.clone();
            sink.emit(&AppEvent::Status {
                phase: state.cycle_state(),
                message: self.last_status.message.clone(),
                seconds_remaining: self.last_status.seconds_remaining,
            });
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

fn reject(sink: &mut impl EventSink, reason: &'static str) {
    warn!("Command rejected: {reason}");
    sink.emit(&AppEvent::CommandRejected { reason });
}

fn write_with_retry(
    what: &str,
    mut write: impl FnMut() -> Result<(), ActuatorError>,
) -> Result<(), ActuatorError> {
    write().or_else(|first| {
        warn!("{what} write failed ({first}), retrying");
        write()
    })
}

fn write_changes(
    hw: &mut impl ActuatorPort,
    applied: Option<ActuatorState>,
    want: ActuatorState,
) -> Result<(), ActuatorError> {
    let stale = |changed: fn(&ActuatorState, &ActuatorState) -> bool| {
        applied.is_none_or(|have| changed(&have, &want))
    };

    if stale(|a, b| a.heater_on != b.heater_on) {
        write_with_retry("heater", || hw.set_heater(want.heater_on))?;
    }
    if stale(|a, b| a.fan_duty_percent != b.fan_duty_percent) {
        write_with_retry("fan", || hw.set_fan_duty(want.fan_duty_percent))?;
    }
    if stale(|a, b| a.door_locked != b.door_locked) {
        write_with_retry("door lock", || hw.set_door_locked(want.door_locked))?;
    }
    Ok(())
}

/// Heater off, fan off, door unlocked.  Each write is retried once, and
/// every one is attempted even if an earlier one fails.
fn write_safe_state(hw: &mut impl ActuatorPort) -> Result<(), ActuatorError> {
    let heater = write_with_retry("heater", || hw.set_heater(false));
    let fan = write_with_retry("fan", || hw.set_fan_duty(0));
    let door = write_with_retry("door lock", || hw.set_door_locked(false));
    for (what, result) in [("heater", heater), ("fan", fan), ("door lock", door)] {
        if let Err(e) = result {
            error!("Safe-state {what} write failed: {e}");
        }
    }
    heater.and(fan).and(door)
}
