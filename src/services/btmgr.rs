use core::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::protocol::{CommandPacket, CommandResult, ExecStatus};

/// Bank the bootloader starts from after the next reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootBank {
    /// Let the bootloader pick.
    #[default]
    None,
    Bank1,
    Bank2,
}

impl TryFrom<u32> for BootBank {
    type Error = ExecStatus;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BootBank::None),
            1 => Ok(BootBank::Bank1),
            2 => Ok(BootBank::Bank2),
            _ => Err(ExecStatus::IllegalParameter),
        }
    }
}

pub trait BootManager {
    fn set_next_boot_bank(&self, bank: BootBank);
    fn next_boot_bank(&self) -> BootBank;

    /// Request a system reset. On hardware this does not return.
    fn system_reset(&self);
}

/// Records reset requests instead of resetting.
#[derive(Debug, Default)]
pub struct SimBootManager {
    next_bank: Cell<BootBank>,
    reset_requests: Cell<u32>,
}

impl SimBootManager {
    pub fn reset_requests(&self) -> u32 {
        self.reset_requests.get()
    }
}

impl BootManager for SimBootManager {
    fn set_next_boot_bank(&self, bank: BootBank) {
        self.next_bank.set(bank);
    }

    fn next_boot_bank(&self) -> BootBank {
        self.next_bank.get()
    }

    fn system_reset(&self) {
        tracing::warn!(bank = ?self.next_bank.get(), "system reset requested");
        self.reset_requests.set(self.reset_requests.get().wrapping_add(1));
    }
}

/// `BTMGR_SET_NEXT_BOOT_BANK(bank: u32)`.
pub fn cmd_set_next_boot_bank(driver: &dyn BootManager, packet: &CommandPacket) -> Result<CommandResult, ExecStatus> {
    let bank = BootBank::try_from(u32::from_be_bytes(packet.params_exact::<4>()?))?;
    driver.set_next_boot_bank(bank);
    Ok(CommandResult::success())
}

/// `BTMGR_SYSTEM_RESET()`.
pub fn cmd_system_reset(driver: &dyn BootManager, _packet: &CommandPacket) -> CommandResult {
    driver.system_reset();
    CommandResult::success()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandId;

    fn bank(value: u32) -> CommandPacket {
        CommandPacket::new(CommandId(0x10), &value.to_be_bytes()).unwrap()
    }

    #[test]
    fn test_boot_bank_selection() {
        let btmgr = SimBootManager::default();
        assert_eq!(btmgr.next_boot_bank(), BootBank::None);

        assert_eq!(cmd_set_next_boot_bank(&btmgr, &bank(2)), Ok(CommandResult::success()));
        assert_eq!(btmgr.next_boot_bank(), BootBank::Bank2);

        assert_eq!(cmd_set_next_boot_bank(&btmgr, &bank(3)), Err(ExecStatus::IllegalParameter));
        assert_eq!(btmgr.next_boot_bank(), BootBank::Bank2);
    }

    #[test]
    fn test_reset_is_recorded() {
        let btmgr = SimBootManager::default();
        cmd_system_reset(&btmgr, &CommandPacket::bare(CommandId(0x11)));
        assert_eq!(btmgr.reset_requests(), 1);
    }
}
