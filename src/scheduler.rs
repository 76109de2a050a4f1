use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppRegistry;
use crate::block::{BlockCommandTable, BlockContext};
use crate::command::CommandDispatcher;
use crate::error::ConfigError;
use crate::task_list::{ModeId, TaskList};
use crate::telemetry::{EventSink, ExecEvent};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_ticks: u64,
    pub cycles_completed: u32,
    pub blocks_fired: u32,
    pub block_failures: u32,
    pub loads: u32,
    pub rejected_loads: u32,
    pub cycle_length: u32,
}

/// What one `advance_tick` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u32,
    pub blocks_fired: u8,
    pub block_failures: u8,
}

#[derive(Debug)]
struct ActiveSchedule {
    mode: Option<ModeId>,
    list: TaskList,
}

/// Single-threaded cyclic executive. Owns the tick counter and the active
/// Task List; blocks, Apps and the dispatcher are lent to it per tick.
#[derive(Debug, Default)]
pub struct CyclicScheduler {
    active: Option<ActiveSchedule>,
    tick: u32,
    stats: SchedulerStats,
}

impl CyclicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and activate a Task List. The tick counter restarts at 0.
    /// On rejection the previously active list stays in place untouched.
    pub fn load(
        &mut self,
        list: TaskList,
        mode: Option<ModeId>,
        table: &BlockCommandTable,
        sink: &mut dyn EventSink,
    ) -> Result<(), ConfigError> {
        if let Err(e) = list.validate(table) {
            self.stats.rejected_loads = self.stats.rejected_loads.wrapping_add(1);
            warn!(error = %e, ?mode, "task list rejected");
            sink.record(ExecEvent::ConfigRejected {
                reason: alloc::string::ToString::to_string(&e),
            });
            return Err(e);
        }

        sink.record(ExecEvent::TaskListLoaded {
            mode,
            cycle_length: list.cycle_length(),
            entries: list.len() as u16,
        });
        info!(?mode, cycle_length = list.cycle_length(), entries = list.len(), "task list loaded");

        self.stats.cycle_length = list.cycle_length();
        self.stats.loads = self.stats.loads.wrapping_add(1);
        self.active = Some(ActiveSchedule { mode, list });
        self.tick = 0;

        Ok(())
    }

    /// Consume one tick: fire every entry due at the current tick in
    /// declaration order, then step the counter modulo the cycle length.
    pub fn advance_tick(
        &mut self,
        table: &mut BlockCommandTable,
        apps: &mut AppRegistry,
        dispatcher: &mut CommandDispatcher,
        sink: &mut dyn EventSink,
    ) -> TickReport {
        let tick = self.tick;
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        self.stats.total_ticks = self.stats.total_ticks.wrapping_add(1);

        let Some(active) = self.active.as_ref() else {
            return report;
        };

        let mut ctx = BlockContext {
            tick,
            apps,
            dispatcher,
            sink,
        };

        for entry in active.list.entries_at(tick) {
            let outcome = table.execute(entry.block, &mut ctx);
            report.blocks_fired = report.blocks_fired.saturating_add(1);
            self.stats.blocks_fired = self.stats.blocks_fired.wrapping_add(1);
            if !outcome.is_success() {
                report.block_failures = report.block_failures.saturating_add(1);
                self.stats.block_failures = self.stats.block_failures.wrapping_add(1);
            }
        }

        let cycle_length = active.list.cycle_length();
        debug_assert!(cycle_length > 0, "validated task list has zero cycle length");

        self.tick = (tick + 1) % cycle_length;
        if self.tick == 0 {
            self.stats.cycles_completed = self.stats.cycles_completed.wrapping_add(1);
        }

        report
    }

    /// Tick the next `advance_tick` will fire.
    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    pub fn active_mode(&self) -> Option<ModeId> {
        self.active.as_ref().and_then(|active| active.mode)
    }

    pub fn active_task_list(&self) -> Option<&TaskList> {
        self.active.as_ref().map(|active| &active.list)
    }

    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}
