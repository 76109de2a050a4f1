//! Internal flash service. Erase and program are started from commands and
//! complete asynchronously; the App polls completion every time it runs.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::convert::Infallible;

use serde::Serialize;

use super::DriverFault;
use crate::app::App;
use crate::error::AppResult;
use crate::protocol::{CommandPacket, CommandResult, ExecStatus};

pub const SIM_FLASH_SIZE: usize = 4096;
pub const FLASH_WORD: usize = 4;
pub const ERASED: u8 = 0xFF;

pub trait IflashDriver {
    /// `WouldBlock` while a previous erase or program is still running.
    fn start_erase(&self) -> nb::Result<(), Infallible>;

    fn start_program(&self, offset: usize, data: &[u8]) -> nb::Result<(), DriverFault>;

    /// `WouldBlock` while an operation is in progress.
    fn status(&self) -> nb::Result<(), DriverFault>;
}

/// Flash domain code for a non-blocking outcome. Busy is reported, never waited on.
pub fn nb_code(result: nb::Result<(), DriverFault>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(nb::Error::WouldBlock) => DriverFault::Busy.code(),
        Err(nb::Error::Other(fault)) => fault.code(),
    }
}

/// Every operation stays busy for one status poll.
#[derive(Debug)]
pub struct SimIflash {
    memory: RefCell<alloc::vec::Vec<u8>>,
    busy: Cell<bool>,
}

impl SimIflash {
    pub fn read(&self, offset: usize, len: usize) -> Option<alloc::vec::Vec<u8>> {
        let end = offset.checked_add(len)?;
        self.memory.borrow().get(offset..end).map(<[u8]>::to_vec)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }
}

impl Default for SimIflash {
    fn default() -> Self {
        Self {
            memory: RefCell::new(alloc::vec![ERASED; SIM_FLASH_SIZE]),
            busy: Cell::new(false),
        }
    }
}

impl IflashDriver for SimIflash {
    fn start_erase(&self) -> nb::Result<(), Infallible> {
        if self.busy.get() {
            return Err(nb::Error::WouldBlock);
        }
        self.memory.borrow_mut().fill(ERASED);
        self.busy.set(true);
        Ok(())
    }

    fn start_program(&self, offset: usize, data: &[u8]) -> nb::Result<(), DriverFault> {
        if self.busy.get() {
            return Err(nb::Error::WouldBlock);
        }
        if offset % FLASH_WORD != 0 || data.len() % FLASH_WORD != 0 {
            return Err(nb::Error::Other(DriverFault::NotAligned));
        }

        let mut memory = self.memory.borrow_mut();
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= memory.len())
            .ok_or(nb::Error::Other(DriverFault::OutOfBounds))?;
        memory[offset..end].copy_from_slice(data);
        self.busy.set(true);
        Ok(())
    }

    fn status(&self) -> nb::Result<(), DriverFault> {
        if self.busy.replace(false) {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IflashInfo {
    /// Last polled status as a flash domain code (0 idle, busy or fault otherwise).
    pub status: i32,
}

pub struct IflashService {
    driver: Rc<dyn IflashDriver>,
    info: IflashInfo,
}

impl IflashService {
    pub fn new(driver: Rc<dyn IflashDriver>) -> Self {
        Self {
            driver,
            info: IflashInfo::default(),
        }
    }

    pub fn info(&self) -> &IflashInfo {
        &self.info
    }
}

impl App for IflashService {
    fn name(&self) -> &str {
        "update_iflash"
    }

    fn init(&mut self) -> AppResult {
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        // Busy is a normal state between polls, not an App failure.
        self.info.status = nb_code(self.driver.status());
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.info).ok()
    }
}

/// `IFLASH_ERASE()`. Parameters are ignored.
pub fn cmd_iflash_erase(driver: &dyn IflashDriver, _packet: &CommandPacket) -> CommandResult {
    let code = match driver.start_erase() {
        Ok(()) => 0,
        Err(nb::Error::WouldBlock) => DriverFault::Busy.code(),
        Err(nb::Error::Other(never)) => match never {},
    };
    CommandResult::with_code(code)
}

/// `IFLASH_PROGRAM(offset: u32, data: [u8])`.
pub fn cmd_iflash_program(driver: &dyn IflashDriver, packet: &CommandPacket) -> Result<CommandResult, ExecStatus> {
    let offset = packet.param_u32(0).ok_or(ExecStatus::IllegalLength)?;
    let data = &packet.params()[4..];
    let code = nb_code(driver.start_program(offset as usize, data));
    Ok(CommandResult::with_code(code))
}
