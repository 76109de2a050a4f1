//! Identifier tables and the default configuration of the services build.

use crate::app::{AppId, InitPolicy};
use crate::block::BlockId;
use crate::config::{BlockConfig, EntryConfig, ExecutiveConfig, ModeConfig, DEFAULT_TICK_PERIOD_MS};
use crate::protocol::{CommandId, CommandPacket};
use crate::task_list::ModeId;

// Commands
pub const CMD_NOP: CommandId = CommandId(0x0000);
pub const CMD_BTMGR_SET_NEXT_BOOT_BANK: CommandId = CommandId(0x0010);
pub const CMD_BTMGR_SYSTEM_RESET: CommandId = CommandId(0x0011);
pub const CMD_GPIO_WRITE: CommandId = CommandId(0x0020);
pub const CMD_IFLASH_ERASE: CommandId = CommandId(0x0030);
pub const CMD_IFLASH_PROGRAM: CommandId = CommandId(0x0031);
pub const CMD_RAMECC_SET_SCRUBBING_INTERVAL: CommandId = CommandId(0x0040);
pub const CMD_UART_REOPEN: CommandId = CommandId(0x0050);
pub const CMD_APP_TMD_MEM_DUMP: CommandId = CommandId(0x0060);

/// App names in registration order; the index is the App id.
pub const APP_NAMES: [&str; 7] = [
    "update_adc",
    "update_thermometer",
    "update_gpio",
    "update_ramecc",
    "update_uart",
    "update_iflash",
    "tlm_mem_dump",
];

pub const AR_UPDATE_ADC: AppId = AppId(0);
pub const AR_UPDATE_THERMOMETER: AppId = AppId(1);
pub const AR_UPDATE_GPIO: AppId = AppId(2);
pub const AR_UPDATE_RAMECC: AppId = AppId(3);
pub const AR_UPDATE_UART: AppId = AppId(4);
pub const AR_UPDATE_IFLASH: AppId = AppId(5);
pub const AR_TLM_MEM_DUMP: AppId = AppId(6);

// Blocks
pub const BC_NOP: BlockId = BlockId(17);
pub const BC_AC_TLM_CMD_HIRATE: BlockId = BlockId(35);
pub const BC_CSRV_ADC: BlockId = BlockId(72);
pub const BC_CSRV_THERMOMETER: BlockId = BlockId(73);
pub const BC_CSRV_GPIO: BlockId = BlockId(74);
pub const BC_CSRV_RAMECC: BlockId = BlockId(75);
pub const BC_CSRV_UART: BlockId = BlockId(76);
pub const BC_CSRV_IFLASH: BlockId = BlockId(77);

pub const MODE_INITIAL: ModeId = ModeId(1);
pub const INITIAL_CYCLE_LENGTH: u32 = 100;

/// Component-service Apps, each scheduled on its own block.
const CSRV_BLOCKS: [(BlockId, &str, u32); 6] = [
    (BC_CSRV_ADC, "update_adc", 60),
    (BC_CSRV_THERMOMETER, "update_thermometer", 65),
    (BC_CSRV_GPIO, "update_gpio", 70),
    (BC_CSRV_RAMECC, "update_ramecc", 75),
    (BC_CSRV_UART, "update_uart", 80),
    (BC_CSRV_IFLASH, "update_iflash", 85),
];

/// Blocks and the "initial" mode for the services installed by
/// [`crate::services::install_services`]. Every component service updates
/// once per cycle.
pub fn default_config() -> ExecutiveConfig {
    let mut blocks = vec![
        BlockConfig::Combiner {
            id: BC_AC_TLM_CMD_HIRATE,
            apps: vec!["tlm_mem_dump".into()],
        },
        BlockConfig::Command {
            id: BC_NOP,
            packet: CommandPacket::bare(CMD_NOP),
        },
    ];
    blocks.extend(CSRV_BLOCKS.iter().map(|&(id, app, _)| BlockConfig::Single { id, app: app.into() }));

    let mut entries = vec![
        EntryConfig {
            offset: 10,
            block: BC_AC_TLM_CMD_HIRATE,
        },
        EntryConfig {
            offset: 40,
            block: BC_NOP,
        },
    ];
    entries.extend(CSRV_BLOCKS.iter().map(|&(block, _, offset)| EntryConfig { offset, block }));

    ExecutiveConfig {
        tick_period_ms: DEFAULT_TICK_PERIOD_MS,
        init_policy: Some(InitPolicy::Tolerant),
        blocks,
        modes: vec![ModeConfig {
            id: MODE_INITIAL,
            name: Some("initial".into()),
            cycle_length: INITIAL_CYCLE_LENGTH,
            entries,
        }],
        initial_mode: Some(MODE_INITIAL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_survives_json() {
        let config = default_config();
        let json = config.to_json().unwrap();
        assert_eq!(ExecutiveConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_initial_offsets_fit_cycle() {
        let config = default_config();
        let mode = config.mode(MODE_INITIAL).unwrap();
        assert!(mode.entries.iter().all(|e| e.offset < mode.cycle_length));
    }
}
