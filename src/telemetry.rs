//! Structured execution events and their collection for telemetry.
//!
//! The scheduler and dispatcher never write telemetry themselves; they emit
//! [`ExecEvent`]s into an [`EventSink`]. [`TelemetryRecorder`] is the sink the
//! executive uses: a bounded ring that overwrites the oldest event when full.

use heapless::Deque;
use serde::Serialize;

use crate::app::{AppId, AppReport};
use crate::block::{BlockId, BlockOutcome};
use crate::command::{CommandState, DispatchStats};
use crate::error::AppError;
use crate::protocol::{CommandId, CommandResult, CommandSource};
use crate::scheduler::SchedulerStats;
use crate::task_list::ModeId;

pub const MAX_EVENTS: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecEvent {
    AppInitialized {
        app: AppId,
        error: Option<AppError>,
    },
    AppUpdated {
        tick: u32,
        block: BlockId,
        app: AppId,
        error: Option<AppError>,
    },
    BlockFired {
        tick: u32,
        block: BlockId,
        outcome: BlockOutcome,
    },
    CommandExecuted {
        tick: u32,
        source: CommandSource,
        id: CommandId,
        state: CommandState,
        result: CommandResult,
    },
    TaskListLoaded {
        mode: Option<ModeId>,
        cycle_length: u32,
        entries: u16,
    },
    ConfigRejected {
        reason: alloc::string::String,
    },
}

pub trait EventSink {
    fn record(&mut self, event: ExecEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: ExecEvent) {}
}

impl EventSink for alloc::vec::Vec<ExecEvent> {
    fn record(&mut self, event: ExecEvent) {
        self.push(event);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecorderStats {
    pub total_recorded: u32,
    pub overwritten: u32,
}

#[derive(Debug, Default)]
pub struct TelemetryRecorder {
    events: Deque<ExecEvent, MAX_EVENTS>,
    stats: RecorderStats,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &ExecEvent> {
        self.events.iter()
    }

    /// Remove and return everything recorded so far, oldest first.
    pub fn drain(&mut self) -> alloc::vec::Vec<ExecEvent> {
        let mut drained = alloc::vec::Vec::with_capacity(self.events.len());
        while let Some(event) = self.events.pop_front() {
            drained.push(event);
        }
        drained
    }

    pub fn stats(&self) -> &RecorderStats {
        &self.stats
    }
}

impl EventSink for TelemetryRecorder {
    fn record(&mut self, event: ExecEvent) {
        if self.events.is_full() {
            let _ = self.events.pop_front();
            self.stats.overwritten = self.stats.overwritten.wrapping_add(1);
        }
        // Room was made above.
        let _ = self.events.push_back(event);
        self.stats.total_recorded = self.stats.total_recorded.wrapping_add(1);
    }
}

/// One downlinkable snapshot of the executive.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryFrame {
    pub sequence_number: u32,
    pub tick: u32,
    pub cycles_completed: u32,
    pub mode: Option<ModeId>,
    pub scheduler: SchedulerStats,
    pub dispatch: DispatchStats,
    pub recorder: RecorderStats,
    pub apps: alloc::vec::Vec<AppReport>,
    pub events: alloc::vec::Vec<ExecEvent>,
}

impl TelemetryFrame {
    pub fn to_json(&self) -> Result<alloc::string::String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
