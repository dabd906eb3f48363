//! Caller ⇄ control-loop channels.
//!
//! Uses `embassy-sync` bounded MPMC channels to bridge the caller's thread
//! with the control-loop worker.  One pair is allocated per controller and
//! shared through an `Arc`, so several cabinets can run in one process.
//!
//! ```text
//! ┌──────────────┐  AppCommand  ┌──────────────┐
//! │    Caller    │────────────▶│ Control Loop  │
//! │              │◀────────────│  (worker)     │
//! └──────────────┘   AppEvent   └──────────────┘
//! ```

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::EventSink;

/// Channel depth for caller commands.
pub const CMD_DEPTH: usize = 8;

/// Channel depth for outbound events.
pub const EVENT_DEPTH: usize = 64;

/// Both directions of one controller.
pub struct ControlChannels {
    /// Inbound: caller → control loop.
    pub commands: Channel<CriticalSectionRawMutex, AppCommand, CMD_DEPTH>,
    /// Outbound: control loop → caller.
    pub events: Channel<CriticalSectionRawMutex, AppEvent, EVENT_DEPTH>,
}

impl ControlChannels {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            commands: Channel::new(),
            events: Channel::new(),
        })
    }
}

/// [`EventSink`] that feeds the outbound channel.
///
/// The worker never blocks on a slow caller: when the queue is full the
/// oldest event is discarded.
pub struct ChannelSink {
    channels: Arc<ControlChannels>,
    dropped: u32,
}

impl ChannelSink {
    pub fn new(channels: Arc<ControlChannels>) -> Self {
        Self {
            channels,
            dropped: 0,
        }
    }

    /// Events discarded because nobody was reading.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: &AppEvent) {
        let mut event = event.clone();
        for _ in 0..2 {
            match self.channels.events.try_send(event) {
                Ok(()) => return,
                Err(embassy_sync::channel::TrySendError::Full(back)) => {
                    event = back;
                    if self.channels.events.try_receive().is_ok() {
                        self.dropped = self.dropped.saturating_add(1);
                        if self.dropped.is_power_of_two() {
                            warn!("Event queue full, {} events dropped so far", self.dropped);
                        }
                    }
                }
            }
        }
    }
}
