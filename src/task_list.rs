use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::block::{BlockCommandTable, BlockId};
use crate::error::ConfigError;

pub const MAX_TASK_ENTRIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeId(pub u16);

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub offset: u32,
    pub block: BlockId,
}

/// Ordered timetable of (tick offset, block) pairs within one cycle.
/// Entries sharing an offset fire in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskList {
    cycle_length: u32,
    entries: Vec<TaskEntry, MAX_TASK_ENTRIES>,
}

impl TaskList {
    pub fn new(cycle_length: u32) -> Self {
        Self {
            cycle_length,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(cycle_length: u32, entries: &[(u32, BlockId)]) -> Result<Self, ConfigError> {
        let mut list = Self::new(cycle_length);
        for &(offset, block) in entries {
            list.push(offset, block)?;
        }
        Ok(list)
    }

    pub fn push(&mut self, offset: u32, block: BlockId) -> Result<(), ConfigError> {
        self.entries
            .push(TaskEntry { offset, block })
            .map_err(|_| ConfigError::TooManyEntries(MAX_TASK_ENTRIES))
    }

    pub fn cycle_length(&self) -> u32 {
        self.cycle_length
    }

    pub fn entries(&self) -> &[TaskEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject a zero cycle, out-of-cycle offsets and dangling block refs.
    pub fn validate(&self, table: &BlockCommandTable) -> Result<(), ConfigError> {
        if self.cycle_length == 0 {
            return Err(ConfigError::ZeroCycleLength);
        }

        for entry in self.entries.iter() {
            if entry.offset >= self.cycle_length {
                return Err(ConfigError::OffsetOutOfRange {
                    offset: entry.offset,
                    cycle_length: self.cycle_length,
                });
            }
            if !table.contains(entry.block) {
                return Err(ConfigError::UnknownBlock(entry.block));
            }
        }

        Ok(())
    }

    /// Entries due at `tick`, in declaration order.
    pub fn entries_at(&self, tick: u32) -> impl Iterator<Item = &TaskEntry> + '_ {
        self.entries.iter().filter(move |entry| entry.offset == tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppId, AppRegistry, FnApp};
    use crate::block::Block;
    use alloc::boxed::Box;

    fn table_with_block(id: u16) -> BlockCommandTable {
        let mut apps = AppRegistry::new();
        apps.register(Box::new(FnApp::new("a", || Ok(()), || Ok(())))).unwrap();
        let mut table = BlockCommandTable::new();
        table.define(BlockId(id), Block::Single(AppId(0)), &apps).unwrap();
        table
    }

    #[test]
    fn test_validation() {
        let table = table_with_block(5);

        let list = TaskList::from_entries(30, &[(0, BlockId(5)), (29, BlockId(5))]).unwrap();
        assert!(list.validate(&table).is_ok());

        let list = TaskList::from_entries(30, &[(30, BlockId(5))]).unwrap();
        assert_eq!(
            list.validate(&table),
            Err(ConfigError::OffsetOutOfRange { offset: 30, cycle_length: 30 })
        );

        let list = TaskList::from_entries(30, &[(3, BlockId(6))]).unwrap();
        assert_eq!(list.validate(&table), Err(ConfigError::UnknownBlock(BlockId(6))));

        assert_eq!(TaskList::new(0).validate(&table), Err(ConfigError::ZeroCycleLength));
    }

    #[test]
    fn test_entries_at_keeps_declaration_order() {
        let list = TaskList::from_entries(30, &[(10, BlockId(2)), (0, BlockId(1)), (10, BlockId(3))]).unwrap();
        let due: alloc::vec::Vec<BlockId> = list.entries_at(10).map(|e| e.block).collect();
        assert_eq!(due, [BlockId(2), BlockId(3)]);
        assert_eq!(list.entries_at(5).count(), 0);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut list = TaskList::new(1000);
        for offset in 0..MAX_TASK_ENTRIES as u32 {
            list.push(offset, BlockId(0)).unwrap();
        }
        assert_eq!(list.push(999, BlockId(0)), Err(ConfigError::TooManyEntries(MAX_TASK_ENTRIES)));
    }
}
