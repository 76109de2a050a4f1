//! Block Command Table: schedulable groupings of Apps addressed by block id.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use tracing::error;

use crate::app::{AppId, AppRegistry, MAX_APPS};
use crate::command::{CommandDispatcher, CommandRegistry};
use crate::error::{AppError, ConfigError};
use crate::protocol::{CommandPacket, CommandSource};
use crate::telemetry::{EventSink, ExecEvent};

pub const MAX_BLOCKS: usize = 80;
pub const MAX_BLOCK_APPS: usize = 16;

const_assert!(MAX_BLOCK_APPS <= MAX_APPS);
const_assert!(MAX_BLOCK_APPS <= u8::MAX as usize);
const_assert!(MAX_BLOCKS <= u16::MAX as usize);

pub type AppList = Vec<AppId, MAX_BLOCK_APPS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round-robin subset: one App per firing, cursor advances with wrap-around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotator {
    apps: AppList,
    cursor: usize,
}

impl Rotator {
    pub fn new(apps: &[AppId]) -> Result<Self, ConfigError> {
        Ok(Self {
            apps: Vec::from_slice(apps).map_err(|_| ConfigError::TooManyApps)?,
            cursor: 0,
        })
    }

    pub fn apps(&self) -> &[AppId] {
        &self.apps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn current(&self) -> Option<AppId> {
        self.apps.get(self.cursor).copied()
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.apps.len().max(1);
    }
}

/// Fixed ordered subset executed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combiner {
    apps: AppList,
}

impl Combiner {
    pub fn new(apps: &[AppId]) -> Result<Self, ConfigError> {
        Ok(Self {
            apps: Vec::from_slice(apps).map_err(|_| ConfigError::TooManyApps)?,
        })
    }

    pub fn apps(&self) -> &[AppId] {
        &self.apps
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Single(AppId),
    Rotator(Rotator),
    Combiner(Combiner),
    /// Pre-built packet routed through the dispatcher when fired.
    Command(CommandPacket),
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Single(_) => BlockKind::Single,
            Block::Rotator(_) => BlockKind::Rotator,
            Block::Combiner(_) => BlockKind::Combiner,
            Block::Command(_) => BlockKind::Command,
        }
    }

    fn app_refs(&self) -> &[AppId] {
        match self {
            Block::Single(app) => core::slice::from_ref(app),
            Block::Rotator(rotator) => rotator.apps(),
            Block::Combiner(combiner) => combiner.apps(),
            Block::Command(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Single,
    Rotator,
    Combiner,
    Command,
}

/// Aggregate outcome of one block firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockOutcome {
    pub executed: u8,
    pub failed: u8,
}

impl BlockOutcome {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Everything a block needs to run besides the table itself.
pub struct BlockContext<'a> {
    pub tick: u32,
    pub apps: &'a mut AppRegistry,
    pub dispatcher: &'a mut CommandDispatcher,
    pub sink: &'a mut dyn EventSink,
}

#[derive(Debug, Clone)]
pub struct BlockCommandTable {
    slots: [Option<Block>; MAX_BLOCKS],
    defined: u16,
}

impl BlockCommandTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            defined: 0,
        }
    }

    /// Define a block. App references are checked against `apps` so a
    /// defined block can never name a missing App.
    pub fn define(&mut self, id: BlockId, block: Block, apps: &AppRegistry) -> Result<(), ConfigError> {
        let slot = self
            .slots
            .get(id.index())
            .ok_or(ConfigError::BlockIdOutOfRange(id))?;
        if slot.is_some() {
            return Err(ConfigError::DuplicateBlock(id));
        }

        let refs = block.app_refs();
        if refs.is_empty() && !matches!(block, Block::Command(_)) {
            return Err(ConfigError::EmptyAppList(id));
        }
        if let Some(missing) = refs.iter().find(|app| !apps.contains(**app)) {
            return Err(ConfigError::UnknownAppIndex(*missing));
        }

        self.slots[id.index()] = Some(block);
        self.defined += 1;
        Ok(())
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.defined as usize
    }

    pub fn is_empty(&self) -> bool {
        self.defined == 0
    }

    /// Defined blocks in id order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|block| (BlockId(index as u16), block)))
    }

    /// Every command block must name a command that has a handler.
    pub fn check_commands(&self, commands: &CommandRegistry) -> Result<(), ConfigError> {
        for (id, block) in self.iter() {
            if let Block::Command(packet) = block {
                if !commands.contains(packet.id()) {
                    return Err(ConfigError::UnknownCommand {
                        block: id,
                        command: packet.id(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Cursor of a rotator block, `None` for other kinds.
    pub fn rotator_cursor(&self, id: BlockId) -> Option<usize> {
        match self.get(id)? {
            Block::Rotator(rotator) => Some(rotator.cursor()),
            _ => None,
        }
    }

    /// Fire one block. Every constituent App runs to completion; a failing
    /// App is recorded and the remaining ones still run.
    pub fn execute(&mut self, id: BlockId, ctx: &mut BlockContext<'_>) -> BlockOutcome {
        let mut outcome = BlockOutcome::default();

        let Some(block) = self.slots.get_mut(id.index()).and_then(Option::as_mut) else {
            error!(block = %id, "scheduled block is not defined");
            outcome.failed = 1;
            return outcome;
        };

        match block {
            Block::Single(app) => run_app(id, *app, ctx, &mut outcome),
            Block::Rotator(rotator) => {
                if let Some(app) = rotator.current() {
                    rotator.advance();
                    run_app(id, app, ctx, &mut outcome);
                }
            }
            Block::Combiner(combiner) => {
                for app in combiner.apps.iter() {
                    run_app(id, *app, ctx, &mut outcome);
                }
            }
            Block::Command(packet) => {
                let result = ctx
                    .dispatcher
                    .dispatch(packet, CommandSource::Internal, ctx.tick, &mut *ctx.sink);
                outcome.executed = 1;
                if !result.is_clean() {
                    outcome.failed = 1;
                }
            }
        }

        ctx.sink.record(ExecEvent::BlockFired {
            tick: ctx.tick,
            block: id,
            outcome,
        });

        outcome
    }
}

impl Default for BlockCommandTable {
    fn default() -> Self {
        Self::new()
    }
}

fn run_app(block: BlockId, app: AppId, ctx: &mut BlockContext<'_>, outcome: &mut BlockOutcome) {
    let error = match ctx.apps.update(app) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => {
            error!(block = %block, app = %app, error = %e, "block references missing app");
            Some(AppError::Failed("app not registered"))
        }
    };

    outcome.executed = outcome.executed.saturating_add(1);
    if error.is_some() {
        outcome.failed = outcome.failed.saturating_add(1);
    }

    ctx.sink.record(ExecEvent::AppUpdated {
        tick: ctx.tick,
        block,
        app,
        error,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FnApp;
    use crate::protocol::{CommandId, CommandResult};
    use crate::telemetry::NullSink;
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    fn registry_with(names: &[&'static str], log: &Rc<RefCell<alloc::vec::Vec<&'static str>>>) -> AppRegistry {
        let mut apps = AppRegistry::new();
        for &name in names {
            let log = Rc::clone(log);
            apps.register(Box::new(FnApp::new(name, || Ok(()), move || {
                log.borrow_mut().push(name);
                Ok(())
            })))
            .unwrap();
        }
        apps
    }

    #[test]
    fn test_rotator_cursor_cycles() {
        let log = Rc::new(RefCell::new(alloc::vec::Vec::new()));
        let mut apps = registry_with(&["a", "b", "c"], &log);
        let mut dispatcher = CommandDispatcher::new(CommandRegistry::new());
        let mut sink = NullSink;
        let mut table = BlockCommandTable::new();
        let rotator = Rotator::new(&[AppId(0), AppId(1), AppId(2)]).unwrap();
        table.define(BlockId(30), Block::Rotator(rotator), &apps).unwrap();

        for k in 0..3 {
            assert_eq!(table.rotator_cursor(BlockId(30)), Some(k));
            let mut ctx = BlockContext {
                tick: 0,
                apps: &mut apps,
                dispatcher: &mut dispatcher,
                sink: &mut sink,
            };
            table.execute(BlockId(30), &mut ctx);
        }

        assert_eq!(table.rotator_cursor(BlockId(30)), Some(0));
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
    }

    #[test]
    fn test_define_rejects_bad_blocks() {
        let log = Rc::new(RefCell::new(alloc::vec::Vec::new()));
        let apps = registry_with(&["a"], &log);
        let mut table = BlockCommandTable::new();

        assert_eq!(
            table.define(BlockId(1), Block::Single(AppId(4)), &apps),
            Err(ConfigError::UnknownAppIndex(AppId(4)))
        );
        assert_eq!(
            table.define(BlockId(2), Block::Combiner(Combiner::new(&[]).unwrap()), &apps),
            Err(ConfigError::EmptyAppList(BlockId(2)))
        );
        assert_eq!(
            table.define(BlockId(MAX_BLOCKS as u16), Block::Single(AppId(0)), &apps),
            Err(ConfigError::BlockIdOutOfRange(BlockId(MAX_BLOCKS as u16)))
        );

        table.define(BlockId(1), Block::Single(AppId(0)), &apps).unwrap();
        assert_eq!(
            table.define(BlockId(1), Block::Single(AppId(0)), &apps),
            Err(ConfigError::DuplicateBlock(BlockId(1)))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_check_commands_names_first_unregistered_id() {
        let log = Rc::new(RefCell::new(alloc::vec::Vec::new()));
        let apps = registry_with(&["a"], &log);
        let mut table = BlockCommandTable::new();
        table.define(BlockId(4), Block::Command(CommandPacket::bare(CommandId(1))), &apps).unwrap();
        table.define(BlockId(9), Block::Command(CommandPacket::bare(CommandId(2))), &apps).unwrap();

        let mut commands = CommandRegistry::new();
        commands.register(CommandId(1), |_: &CommandPacket| CommandResult::success()).unwrap();
        assert_eq!(
            table.check_commands(&commands),
            Err(ConfigError::UnknownCommand {
                block: BlockId(9),
                command: CommandId(2),
            })
        );

        commands.register(CommandId(2), |_: &CommandPacket| CommandResult::success()).unwrap();
        assert_eq!(table.check_commands(&commands), Ok(()));
    }
}
