use alloc::rc::Rc;
use core::cell::Cell;

use serde::Serialize;

use super::{driver_result, DriverFault};
use crate::app::App;
use crate::error::AppResult;
use crate::protocol::{CommandPacket, CommandResult, ExecStatus};

pub const UART_CHANNELS: usize = 6;
pub const DEFAULT_BAUD: u32 = 115_200;

pub trait UartDriver {
    fn reopen(&self, channel: u8, baud: u32) -> Result<(), DriverFault>;

    /// Baud rate of an open channel, `None` when closed.
    fn baud(&self, channel: u8) -> Result<Option<u32>, DriverFault>;
}

#[derive(Debug)]
pub struct SimUart {
    channels: Cell<[Option<u32>; UART_CHANNELS]>,
}

impl Default for SimUart {
    fn default() -> Self {
        Self {
            channels: Cell::new([Some(DEFAULT_BAUD); UART_CHANNELS]),
        }
    }
}

impl UartDriver for SimUart {
    fn reopen(&self, channel: u8, baud: u32) -> Result<(), DriverFault> {
        let mut channels = self.channels.get();
        let slot = channels.get_mut(channel as usize).ok_or(DriverFault::Port(channel))?;
        if baud == 0 {
            return Err(DriverFault::Logic);
        }
        *slot = Some(baud);
        self.channels.set(channels);
        Ok(())
    }

    fn baud(&self, channel: u8) -> Result<Option<u32>, DriverFault> {
        self.channels
            .get()
            .get(channel as usize)
            .copied()
            .ok_or(DriverFault::Port(channel))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UartInfo {
    pub baud: [Option<u32>; UART_CHANNELS],
}

pub struct UartService {
    driver: Rc<dyn UartDriver>,
    info: UartInfo,
}

impl UartService {
    pub fn new(driver: Rc<dyn UartDriver>) -> Self {
        Self {
            driver,
            info: UartInfo::default(),
        }
    }

    pub fn info(&self) -> &UartInfo {
        &self.info
    }
}

impl App for UartService {
    fn name(&self) -> &str {
        "update_uart"
    }

    fn init(&mut self) -> AppResult {
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        for (channel, baud) in self.info.baud.iter_mut().enumerate() {
            *baud = self.driver.baud(channel as u8)?;
        }
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.info).ok()
    }
}

/// `UART_REOPEN(channel: u8, baud: u32)`.
pub fn cmd_uart_reopen(driver: &dyn UartDriver, packet: &CommandPacket) -> Result<CommandResult, ExecStatus> {
    let [channel, b0, b1, b2, b3] = packet.params_exact::<5>()?;
    let baud = u32::from_be_bytes([b0, b1, b2, b3]);
    Ok(driver_result(driver.reopen(channel, baud)))
}
