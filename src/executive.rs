//! The onboard executive: owns every registry and drives them from one
//! thread of control. Registration happens before [`OnboardExecutive::start`];
//! afterwards only modes and Task Lists may change.

use heapless::Vec;
use tracing::{info, warn};

use crate::app::{App, AppId, AppRegistry, InitPolicy, InitSummary};
use crate::block::{Block, BlockCommandTable, BlockId};
use crate::command::{CommandDispatcher, CommandHandler, CommandRegistry};
use crate::config::ExecutiveConfig;
use crate::error::{ConfigError, ExecutiveError, ProtocolError, RegistrationError};
use crate::protocol::{CommandAck, CommandId, CommandPacket, CommandSource, ExecStatus};
use crate::scheduler::{CyclicScheduler, TickReport};
use crate::task_list::{ModeId, TaskList};
use crate::telemetry::{EventSink, ExecEvent, TelemetryFrame, TelemetryRecorder};

pub const MAX_MODES: usize = 8;

#[derive(Debug, Clone)]
struct Mode {
    id: ModeId,
    name: Option<String>,
    list: TaskList,
}

#[derive(Debug)]
pub struct OnboardExecutive {
    apps: AppRegistry,
    blocks: BlockCommandTable,
    scheduler: CyclicScheduler,
    dispatcher: CommandDispatcher,
    recorder: TelemetryRecorder,
    modes: Vec<Mode, MAX_MODES>,
    initial_mode: Option<ModeId>,
    started: bool,
    telemetry_sequence: u32,
}

impl OnboardExecutive {
    pub fn new() -> Self {
        Self {
            apps: AppRegistry::new(),
            blocks: BlockCommandTable::new(),
            scheduler: CyclicScheduler::new(),
            dispatcher: CommandDispatcher::new(CommandRegistry::new()),
            recorder: TelemetryRecorder::new(),
            modes: Vec::new(),
            initial_mode: None,
            started: false,
            telemetry_sequence: 0,
        }
    }

    pub fn set_init_policy(&mut self, policy: InitPolicy) {
        self.apps.set_policy(policy);
    }

    fn ensure_open(&self) -> Result<(), RegistrationError> {
        if self.started {
            Err(RegistrationError::Frozen)
        } else {
            Ok(())
        }
    }

    pub fn register_app(&mut self, app: Box<dyn App>) -> Result<AppId, RegistrationError> {
        self.ensure_open()?;
        let id = self.apps.register(app)?;
        info!(app = %id, name = self.apps.name_of(id).unwrap_or_default(), "app registered");
        Ok(id)
    }

    pub fn register_command<H>(&mut self, id: CommandId, handler: H) -> Result<(), RegistrationError>
    where
        H: CommandHandler + 'static,
    {
        self.ensure_open()?;
        self.dispatcher.registry_mut().register(id, handler)
    }

    pub fn define_block(&mut self, id: BlockId, block: Block) -> Result<(), ExecutiveError> {
        self.ensure_open()?;
        self.blocks.define(id, block, &self.apps)?;
        Ok(())
    }

    /// Add or replace a mode. The Task List is validated against the
    /// current Block Command Table before it is stored.
    pub fn define_mode(&mut self, id: ModeId, list: TaskList) -> Result<(), ConfigError> {
        list.validate(&self.blocks)?;
        insert_mode(&mut self.modes, Mode { id, name: None, list })
    }

    pub fn set_initial_mode(&mut self, id: ModeId) -> Result<(), ConfigError> {
        if self.mode(id).is_none() {
            return Err(ConfigError::UnknownMode(id));
        }
        self.initial_mode = Some(id);
        Ok(())
    }

    /// Load a mode's Task List. The tick counter restarts at zero.
    pub fn enter_mode(&mut self, id: ModeId) -> Result<(), ConfigError> {
        let Some(list) = self.mode(id).cloned() else {
            warn!(mode = %id, "mode not defined");
            return Err(ConfigError::UnknownMode(id));
        };
        self.scheduler.load(list, Some(id), &self.blocks, &mut self.recorder)?;
        info!(mode = %id, name = self.mode_name(id).unwrap_or_default(), "mode entered");
        Ok(())
    }

    /// Load a Task List that is not part of the mode table.
    pub fn load_task_list(&mut self, list: TaskList) -> Result<(), ConfigError> {
        self.scheduler.load(list, None, &self.blocks, &mut self.recorder)
    }

    /// Apply a configuration document. Blocks and modes are staged on copies
    /// and committed only when the whole document checks out.
    pub fn apply_config(&mut self, config: &ExecutiveConfig) -> Result<(), ExecutiveError> {
        match self.stage_config(config) {
            Ok((blocks, modes)) => {
                self.blocks = blocks;
                self.modes = modes;
                if let Some(policy) = config.init_policy {
                    self.apps.set_policy(policy);
                }
                if let Some(initial) = config.initial_mode {
                    self.initial_mode = Some(initial);
                    if self.started {
                        self.enter_mode(initial)?;
                    }
                }
                info!(
                    blocks = config.blocks.len(),
                    modes = config.modes.len(),
                    "configuration applied"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "configuration rejected");
                self.recorder.record(ExecEvent::ConfigRejected { reason: e.to_string() });
                Err(e)
            }
        }
    }

    fn stage_config(
        &self,
        config: &ExecutiveConfig,
    ) -> Result<(BlockCommandTable, Vec<Mode, MAX_MODES>), ExecutiveError> {
        if !config.blocks.is_empty() {
            self.ensure_open()?;
        }

        let mut blocks = self.blocks.clone();
        for block in &config.blocks {
            blocks.define(block.id(), block.to_block(&self.apps)?, &self.apps)?;
        }

        let mut modes = self.modes.clone();
        for mode in &config.modes {
            let list = mode.to_task_list()?;
            list.validate(&blocks)?;
            insert_mode(
                &mut modes,
                Mode {
                    id: mode.id,
                    name: mode.name.clone(),
                    list,
                },
            )?;
        }

        if let Some(initial) = config.initial_mode {
            if !modes.iter().any(|mode| mode.id == initial) {
                return Err(ConfigError::UnknownMode(initial).into());
            }
        }

        Ok((blocks, modes))
    }

    /// Initialize every App once, freeze the registries and enter the
    /// initial mode if one is configured. Command blocks are checked against
    /// the command registry first, since neither can change afterwards.
    pub fn start(&mut self) -> Result<InitSummary, ExecutiveError> {
        self.ensure_open()?;
        if let Err(e) = self.blocks.check_commands(self.dispatcher.registry()) {
            warn!(error = %e, "start refused");
            return Err(e.into());
        }

        let summary = self.apps.init_all();
        for index in 0..self.apps.len() {
            let app = AppId(index as u16);
            let error = summary
                .failed
                .iter()
                .find(|(failed, _)| *failed == app)
                .map(|(_, e)| *e);
            self.recorder.record(ExecEvent::AppInitialized { app, error });
        }

        self.started = true;
        info!(
            apps = self.apps.len(),
            blocks = self.blocks.len(),
            commands = self.dispatcher.registry().len(),
            init_failures = summary.failed.len(),
            "executive started"
        );

        if let Some(initial) = self.initial_mode {
            self.enter_mode(initial)?;
        }

        Ok(summary)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Advance the schedule by one tick.
    pub fn tick(&mut self) -> Result<TickReport, ExecutiveError> {
        if !self.started {
            return Err(ExecutiveError::NotStarted);
        }
        Ok(self.scheduler.advance_tick(
            &mut self.blocks,
            &mut self.apps,
            &mut self.dispatcher,
            &mut self.recorder,
        ))
    }

    /// Dispatch one packet between ticks and build the originator's ack.
    pub fn dispatch(&mut self, packet: &CommandPacket, source: CommandSource) -> CommandAck {
        let tick = self.scheduler.current_tick();
        let result = self.dispatcher.dispatch(packet, source, tick, &mut self.recorder);
        let sequence = self
            .dispatcher
            .last_record()
            .map(|record| record.sequence)
            .unwrap_or_default();

        let message = match result.exec {
            ExecStatus::Success if result.err_code != 0 => Some(format!("driver error {}", result.err_code)),
            ExecStatus::Success => None,
            ExecStatus::UnknownCommand => Some(format!("unknown command {}", packet.id())),
            other => Some(format!("{other:?}")),
        };

        CommandAck {
            id: packet.id(),
            sequence,
            source,
            tick,
            result,
            message,
        }
    }

    /// Decode an already-framed uplink packet and dispatch it as a ground command.
    pub fn receive_uplink(&mut self, bytes: &[u8]) -> Result<CommandAck, ProtocolError> {
        let packet = CommandPacket::from_bytes(bytes)?;
        Ok(self.dispatch(&packet, CommandSource::Ground))
    }

    pub fn receive_json(&mut self, line: &str) -> Result<CommandAck, ProtocolError> {
        let packet = CommandPacket::from_json(line)?;
        Ok(self.dispatch(&packet, CommandSource::Ground))
    }

    /// Snapshot for downlink. Drains the recorded events into the frame.
    pub fn telemetry_frame(&mut self) -> TelemetryFrame {
        self.telemetry_sequence = self.telemetry_sequence.wrapping_add(1);
        let stats = self.scheduler.get_stats().clone();
        TelemetryFrame {
            sequence_number: self.telemetry_sequence,
            tick: self.scheduler.current_tick(),
            cycles_completed: stats.cycles_completed,
            mode: self.scheduler.active_mode(),
            scheduler: stats,
            dispatch: self.dispatcher.stats().clone(),
            recorder: self.recorder.stats().clone(),
            apps: self.apps.reports(),
            events: self.recorder.drain(),
        }
    }

    fn mode(&self, id: ModeId) -> Option<&TaskList> {
        self.modes.iter().find(|mode| mode.id == id).map(|mode| &mode.list)
    }

    pub fn mode_name(&self, id: ModeId) -> Option<&str> {
        self.modes
            .iter()
            .find(|mode| mode.id == id)
            .and_then(|mode| mode.name.as_deref())
    }

    pub fn mode_ids(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.modes.iter().map(|mode| mode.id)
    }

    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    pub fn blocks(&self) -> &BlockCommandTable {
        &self.blocks
    }

    pub fn scheduler(&self) -> &CyclicScheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn recorder(&self) -> &TelemetryRecorder {
        &self.recorder
    }
}

impl Default for OnboardExecutive {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_mode(modes: &mut Vec<Mode, MAX_MODES>, mode: Mode) -> Result<(), ConfigError> {
    if let Some(existing) = modes.iter_mut().find(|m| m.id == mode.id) {
        *existing = mode;
        return Ok(());
    }
    modes.push(mode).map_err(|_| ConfigError::TooManyModes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FnApp;
    use crate::protocol::CommandResult;

    fn executive() -> OnboardExecutive {
        let mut exec = OnboardExecutive::new();
        exec.register_app(Box::new(FnApp::new("a", || Ok(()), || Ok(())))).unwrap();
        exec.define_block(BlockId(1), Block::Single(AppId(0))).unwrap();
        exec
    }

    #[test]
    fn test_registration_frozen_after_start() {
        let mut exec = executive();
        exec.start().unwrap();

        let app = exec.register_app(Box::new(FnApp::new("late", || Ok(()), || Ok(()))));
        assert_eq!(app, Err(RegistrationError::Frozen));

        let cmd = exec.register_command(CommandId(1), |_: &CommandPacket| CommandResult::success());
        assert_eq!(cmd, Err(RegistrationError::Frozen));

        assert_eq!(
            exec.define_block(BlockId(2), Block::Single(AppId(0))),
            Err(ExecutiveError::Registration(RegistrationError::Frozen))
        );
        assert!(matches!(exec.start(), Err(ExecutiveError::Registration(RegistrationError::Frozen))));
    }

    #[test]
    fn test_tick_requires_start() {
        let mut exec = executive();
        assert_eq!(exec.tick(), Err(ExecutiveError::NotStarted));
    }

    #[test]
    fn test_initial_mode_entered_on_start() {
        let mut exec = executive();
        exec.define_mode(ModeId(1), TaskList::from_entries(5, &[(0, BlockId(1))]).unwrap())
            .unwrap();
        exec.set_initial_mode(ModeId(1)).unwrap();
        exec.start().unwrap();

        assert_eq!(exec.scheduler().active_mode(), Some(ModeId(1)));
        assert_eq!(exec.tick().unwrap().blocks_fired, 1);
        assert_eq!(exec.set_initial_mode(ModeId(9)), Err(ConfigError::UnknownMode(ModeId(9))));
    }
}
