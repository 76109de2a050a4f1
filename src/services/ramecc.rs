use alloc::rc::Rc;
use core::cell::Cell;

use serde::{Deserialize, Serialize};

use super::{driver_result, DriverFault};
use crate::app::App;
use crate::error::AppResult;
use crate::protocol::{CommandPacket, CommandResult, ExecStatus};

pub const DEFAULT_SCRUBBING_INTERVAL: u32 = 1000;

/// Error counters of the RAM and DTCM ECC scrubber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RameccInfo {
    pub scrubbing_interval: u32,
    pub scrubbing_loop: u32,
    pub single_error: u32,
    pub double_error: u32,
    pub double_error_on_byte_write: u32,
    pub dtcm_single_error: u32,
    pub dtcm_double_error: u32,
    pub dtcm_double_error_on_byte_write: u32,
}

pub trait RameccDriver {
    fn set_scrubbing_interval(&self, ticks: u32) -> Result<(), DriverFault>;
    fn status(&self) -> Result<RameccInfo, DriverFault>;
}

/// Each status read counts as one completed scrubbing loop.
#[derive(Debug)]
pub struct SimRamecc {
    info: Cell<RameccInfo>,
}

impl SimRamecc {
    pub fn inject_single_error(&self) {
        let mut info = self.info.get();
        info.single_error = info.single_error.wrapping_add(1);
        self.info.set(info);
    }
}

impl Default for SimRamecc {
    fn default() -> Self {
        Self {
            info: Cell::new(RameccInfo {
                scrubbing_interval: DEFAULT_SCRUBBING_INTERVAL,
                ..RameccInfo::default()
            }),
        }
    }
}

impl RameccDriver for SimRamecc {
    fn set_scrubbing_interval(&self, ticks: u32) -> Result<(), DriverFault> {
        let mut info = self.info.get();
        info.scrubbing_interval = ticks;
        self.info.set(info);
        Ok(())
    }

    fn status(&self) -> Result<RameccInfo, DriverFault> {
        let mut info = self.info.get();
        info.scrubbing_loop = info.scrubbing_loop.wrapping_add(1);
        self.info.set(info);
        Ok(info)
    }
}

pub struct RameccService {
    driver: Rc<dyn RameccDriver>,
    info: RameccInfo,
}

impl RameccService {
    pub fn new(driver: Rc<dyn RameccDriver>) -> Self {
        Self {
            driver,
            info: RameccInfo::default(),
        }
    }

    pub fn info(&self) -> &RameccInfo {
        &self.info
    }
}

impl App for RameccService {
    fn name(&self) -> &str {
        "update_ramecc"
    }

    fn init(&mut self) -> AppResult {
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        self.info = self.driver.status()?;
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.info).ok()
    }
}

/// `RAMECC_SET_SCRUBBING_INTERVAL(ticks: u32)`.
pub fn cmd_set_scrubbing_interval(
    driver: &dyn RameccDriver,
    packet: &CommandPacket,
) -> Result<CommandResult, ExecStatus> {
    let ticks = u32::from_be_bytes(packet.params_exact::<4>()?);
    Ok(driver_result(driver.set_scrubbing_interval(ticks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandId;

    #[test]
    fn test_set_interval_then_update() {
        let ramecc = Rc::new(SimRamecc::default());
        let packet = CommandPacket::new(CommandId(0x40), &500u32.to_be_bytes()).unwrap();
        assert_eq!(cmd_set_scrubbing_interval(ramecc.as_ref(), &packet), Ok(CommandResult::success()));

        ramecc.inject_single_error();
        let mut service = RameccService::new(ramecc.clone());
        service.update().unwrap();
        service.update().unwrap();

        assert_eq!(service.info().scrubbing_interval, 500);
        assert_eq!(service.info().scrubbing_loop, 2);
        assert_eq!(service.info().single_error, 1);
    }

    #[test]
    fn test_interval_needs_four_bytes() {
        let ramecc = SimRamecc::default();
        let packet = CommandPacket::new(CommandId(0x40), &[0, 1]).unwrap();
        assert_eq!(cmd_set_scrubbing_interval(&ramecc, &packet), Err(ExecStatus::IllegalLength));
    }
}
