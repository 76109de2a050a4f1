use serde::Serialize;
use thiserror::Error;

use crate::app::AppId;
use crate::block::BlockId;
use crate::protocol::CommandId;
use crate::task_list::ModeId;

/// Rejection of a Task List, Block Command Table entry or configuration
/// document. A load that fails with this error leaves the active schedule
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cycle length must be at least one tick")]
    ZeroCycleLength,
    #[error("tick offset {offset} outside cycle of {cycle_length} ticks")]
    OffsetOutOfRange { offset: u32, cycle_length: u32 },
    #[error("task list references unknown block {0}")]
    UnknownBlock(BlockId),
    #[error("block {0} already defined")]
    DuplicateBlock(BlockId),
    #[error("block id {0} exceeds table capacity")]
    BlockIdOutOfRange(BlockId),
    #[error("block references unregistered app index {0}")]
    UnknownAppIndex(AppId),
    #[error("block references unregistered app '{0}'")]
    UnknownAppName(String),
    #[error("command block {block} sends unregistered command {command}")]
    UnknownCommand { block: BlockId, command: CommandId },
    #[error("block {0} has an empty app list")]
    EmptyAppList(BlockId),
    #[error("block app list exceeds capacity")]
    TooManyApps,
    #[error("task list exceeds {0} entries")]
    TooManyEntries(usize),
    #[error("mode {0} is not defined")]
    UnknownMode(ModeId),
    #[error("mode table is full")]
    TooManyModes,
    #[error("configuration parse error: {0}")]
    Parse(String),
}

/// Startup-time registration defect. Fatal: the executive refuses to start
/// with a roster that produced one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("app name '{0}' already registered")]
    DuplicateName(String),
    #[error("command {0} already registered")]
    DuplicateId(CommandId),
    #[error("command id {0} exceeds registry capacity")]
    CommandIdOutOfRange(CommandId),
    #[error("app name '{0}' too long")]
    NameTooLong(String),
    #[error("registry capacity exceeded")]
    CapacityExceeded,
    #[error("registries are frozen after start")]
    Frozen,
    #[error("app index {0} not registered")]
    NotFound(AppId),
}

/// Failure reported by an App's `init` or `update` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
pub enum AppError {
    #[error("driver reported error code {code}")]
    Driver { code: i32 },
    #[error("{0}")]
    Failed(&'static str),
    #[error("app skipped: init did not succeed")]
    NotInitialized,
}

pub type AppResult = Result<(), AppError>;

/// Uplink decode failure. Framing is done by the transport; this only
/// covers the identifier/length/parameter shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("packet shorter than its header")]
    Truncated,
    #[error("declared parameter length {declared} but {actual} bytes follow")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("parameter length {0} exceeds maximum")]
    ParamsTooLong(usize),
    #[error("invalid JSON command")]
    InvalidJson,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutiveError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("executive not started")]
    NotStarted,
}
