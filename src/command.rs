//! Command Registry and Command Dispatcher.
//!
//! Lifecycle of one command:
//! `Received -> LookedUp -> { Unknown | Dispatched -> Executed }`.
//! Both terminal states yield a [`CommandResult`] for the originator.

use core::fmt;

use heapless::Deque;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RegistrationError;
use crate::protocol::{CommandId, CommandPacket, CommandResult, CommandSource, ExecStatus};
use crate::telemetry::{EventSink, ExecEvent};

pub const MAX_COMMANDS: usize = 512;
pub const MAX_COMMAND_HISTORY: usize = 16;

/// Handler for one command identifier. Handlers validate their own
/// parameters and answer with a parameter error instead of touching
/// anything out of bounds.
pub trait CommandHandler {
    fn handle(&mut self, packet: &CommandPacket) -> CommandResult;
}

impl<F> CommandHandler for F
where
    F: FnMut(&CommandPacket) -> CommandResult,
{
    fn handle(&mut self, packet: &CommandPacket) -> CommandResult {
        self(packet)
    }
}

pub struct CommandRegistry {
    handlers: alloc::vec::Vec<Option<alloc::boxed::Box<dyn CommandHandler>>>,
    registered: u16,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: (0..MAX_COMMANDS).map(|_| None).collect(),
            registered: 0,
        }
    }

    pub fn register<H>(&mut self, id: CommandId, handler: H) -> Result<(), RegistrationError>
    where
        H: CommandHandler + 'static,
    {
        self.register_boxed(id, alloc::boxed::Box::new(handler))
    }

    pub fn register_boxed(
        &mut self,
        id: CommandId,
        handler: alloc::boxed::Box<dyn CommandHandler>,
    ) -> Result<(), RegistrationError> {
        let slot = self
            .handlers
            .get_mut(id.0 as usize)
            .ok_or(RegistrationError::CommandIdOutOfRange(id))?;
        if slot.is_some() {
            return Err(RegistrationError::DuplicateId(id));
        }
        *slot = Some(handler);
        self.registered += 1;
        Ok(())
    }

    pub fn contains(&self, id: CommandId) -> bool {
        matches!(self.handlers.get(id.0 as usize), Some(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.registered as usize
    }

    pub fn is_empty(&self) -> bool {
        self.registered == 0
    }

    fn handler_mut(&mut self, id: CommandId) -> Option<&mut (dyn CommandHandler + 'static)> {
        self.handlers.get_mut(id.0 as usize)?.as_deref_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = CommandId> + '_ {
        self.handlers
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| CommandId(index as u16))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("registered", &self.registered)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    Received,
    LookedUp,
    Unknown,
    Dispatched,
    Executed,
}

impl CommandState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandState::Unknown | CommandState::Executed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub sequence: u32,
    pub id: CommandId,
    pub source: CommandSource,
    pub tick: u32,
    pub state: CommandState,
    pub result: Option<CommandResult>,
}

impl CommandRecord {
    fn transition(&mut self, state: CommandState) {
        debug!(sequence = self.sequence, id = %self.id, from = ?self.state, to = ?state, "command state");
        self.state = state;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub received: u32,
    pub executed: u32,
    pub succeeded: u32,
    pub exec_failures: u32,
    pub driver_errors: u32,
    pub unknown: u32,
}

#[derive(Debug)]
pub struct CommandDispatcher {
    registry: CommandRegistry,
    history: Deque<CommandRecord, MAX_COMMAND_HISTORY>,
    stats: DispatchStats,
    sequence: u32,
}

impl CommandDispatcher {
    pub fn new(registry: CommandRegistry) -> Self {
        Self {
            registry,
            history: Deque::new(),
            stats: DispatchStats::default(),
            sequence: 0,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Route `packet` to its handler and return the handler's result as is.
    /// An unregistered id yields `UnknownCommand` without running anything.
    pub fn dispatch(
        &mut self,
        packet: &CommandPacket,
        source: CommandSource,
        tick: u32,
        sink: &mut dyn EventSink,
    ) -> CommandResult {
        self.sequence = self.sequence.wrapping_add(1);
        self.stats.received = self.stats.received.wrapping_add(1);

        let mut record = CommandRecord {
            sequence: self.sequence,
            id: packet.id(),
            source,
            tick,
            state: CommandState::Received,
            result: None,
        };

        let handler = self.registry.handler_mut(packet.id());
        record.transition(CommandState::LookedUp);

        let result = match handler {
            None => {
                record.transition(CommandState::Unknown);
                self.stats.unknown = self.stats.unknown.wrapping_add(1);
                warn!(id = %packet.id(), ?source, "unknown command");
                CommandResult::rejected(ExecStatus::UnknownCommand)
            }
            Some(handler) => {
                record.transition(CommandState::Dispatched);
                let result = handler.handle(packet);
                record.transition(CommandState::Executed);

                self.stats.executed = self.stats.executed.wrapping_add(1);
                if !result.is_success() {
                    self.stats.exec_failures = self.stats.exec_failures.wrapping_add(1);
                    warn!(id = %packet.id(), exec = ?result.exec, "command rejected by handler");
                } else if result.err_code != 0 {
                    self.stats.driver_errors = self.stats.driver_errors.wrapping_add(1);
                    warn!(id = %packet.id(), err_code = result.err_code, "command driver error");
                } else {
                    self.stats.succeeded = self.stats.succeeded.wrapping_add(1);
                }
                result
            }
        };

        record.result = Some(result);
        sink.record(ExecEvent::CommandExecuted {
            tick,
            source,
            id: packet.id(),
            state: record.state,
            result,
        });

        if self.history.is_full() {
            let _ = self.history.pop_front();
        }
        let _ = self.history.push_back(record);

        result
    }

    pub fn last_record(&self) -> Option<&CommandRecord> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &CommandRecord> {
        self.history.iter()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}
