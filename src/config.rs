//! JSON configuration for the executive: init policy, block definitions and
//! the mode table. Documents are validated as a whole when applied; a
//! rejected document changes nothing.

use serde::{Deserialize, Serialize};

use crate::app::{AppId, AppRegistry, InitPolicy};
use crate::block::{Block, BlockId, Combiner, Rotator};
use crate::error::ConfigError;
use crate::protocol::CommandPacket;
use crate::task_list::{ModeId, TaskList};

pub const DEFAULT_TICK_PERIOD_MS: u64 = 10;

/// App reference by registry index or by registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppRef {
    Index(u16),
    Name(String),
}

impl AppRef {
    pub fn resolve(&self, apps: &AppRegistry) -> Result<AppId, ConfigError> {
        match self {
            AppRef::Index(index) => {
                let id = AppId(*index);
                if apps.contains(id) {
                    Ok(id)
                } else {
                    Err(ConfigError::UnknownAppIndex(id))
                }
            }
            AppRef::Name(name) => apps
                .find_by_name(name)
                .ok_or_else(|| ConfigError::UnknownAppName(name.clone())),
        }
    }
}

impl From<&str> for AppRef {
    fn from(name: &str) -> Self {
        AppRef::Name(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockConfig {
    Single { id: BlockId, app: AppRef },
    Rotator { id: BlockId, apps: Vec<AppRef> },
    Combiner { id: BlockId, apps: Vec<AppRef> },
    Command { id: BlockId, packet: CommandPacket },
}

impl BlockConfig {
    pub fn id(&self) -> BlockId {
        match self {
            BlockConfig::Single { id, .. }
            | BlockConfig::Rotator { id, .. }
            | BlockConfig::Combiner { id, .. }
            | BlockConfig::Command { id, .. } => *id,
        }
    }

    /// Build the runtime block, resolving App names against `apps`.
    pub fn to_block(&self, apps: &AppRegistry) -> Result<Block, ConfigError> {
        let block = match self {
            BlockConfig::Single { app, .. } => Block::Single(app.resolve(apps)?),
            BlockConfig::Rotator { apps: refs, .. } => Block::Rotator(Rotator::new(&resolve_all(refs, apps)?)?),
            BlockConfig::Combiner { apps: refs, .. } => Block::Combiner(Combiner::new(&resolve_all(refs, apps)?)?),
            BlockConfig::Command { packet, .. } => Block::Command(packet.clone()),
        };
        Ok(block)
    }
}

fn resolve_all(refs: &[AppRef], apps: &AppRegistry) -> Result<Vec<AppId>, ConfigError> {
    refs.iter().map(|app| app.resolve(apps)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub offset: u32,
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub id: ModeId,
    #[serde(default)]
    pub name: Option<String>,
    pub cycle_length: u32,
    pub entries: Vec<EntryConfig>,
}

impl ModeConfig {
    pub fn to_task_list(&self) -> Result<TaskList, ConfigError> {
        let mut list = TaskList::new(self.cycle_length);
        for entry in &self.entries {
            list.push(entry.offset, entry.block)?;
        }
        Ok(list)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutiveConfig {
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    /// Left out, the executive keeps the policy it already has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_policy: Option<InitPolicy>,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
    #[serde(default)]
    pub modes: Vec<ModeConfig>,
    #[serde(default)]
    pub initial_mode: Option<ModeId>,
}

fn default_tick_period_ms() -> u64 {
    DEFAULT_TICK_PERIOD_MS
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            init_policy: None,
            blocks: Vec::new(),
            modes: Vec::new(),
            initial_mode: None,
        }
    }
}

impl ExecutiveConfig {
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn mode(&self, id: ModeId) -> Option<&ModeConfig> {
        self.modes.iter().find(|mode| mode.id == id)
    }
}
