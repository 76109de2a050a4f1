//! Component services: driver-facing Apps and command handlers that plug
//! into the executive through the App and Command contracts.
//!
//! Each service talks to its hardware through a small driver trait. Drivers
//! are shared between a service's App and its command handlers through `Rc`,
//! so driver methods take `&self`; the simulated drivers keep their state in
//! `Cell`/`RefCell`.

pub mod adc;
pub mod btmgr;
pub mod gpio;
pub mod iflash;
pub mod mem_dump;
pub mod ramecc;
pub mod thermometer;
pub mod uart;

use alloc::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandHandler;
use crate::error::{AppError, ExecutiveError};
use crate::executive::OnboardExecutive;
use crate::protocol::{CommandId, CommandPacket, CommandResult, ExecStatus};
use crate::settings;

pub use adc::{AdcDriver, SimAdc};
pub use btmgr::{BootBank, BootManager, SimBootManager};
pub use gpio::{GpioDriver, Level, SimGpio};
pub use iflash::{IflashDriver, SimIflash};
pub use mem_dump::{MemorySpace, SimMemory};
pub use ramecc::{RameccDriver, SimRamecc};
pub use thermometer::{SimThermometer, ThermometerDriver};
pub use uart::{SimUart, UartDriver};

/// Hardware-level failure reported by a driver. Surfaced to the ground as
/// the domain code of an otherwise successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum DriverFault {
    #[error("port or channel {0} does not exist")]
    Port(u8),
    #[error("operation already in progress")]
    Busy,
    #[error("invalid value for this driver")]
    Logic,
    #[error("address range out of bounds")]
    OutOfBounds,
    #[error("address not aligned")]
    NotAligned,
}

impl DriverFault {
    pub fn code(self) -> i32 {
        match self {
            DriverFault::Port(_) => -1,
            DriverFault::Busy => -2,
            DriverFault::Logic => -3,
            DriverFault::OutOfBounds => -4,
            DriverFault::NotAligned => -5,
        }
    }
}

impl From<DriverFault> for AppError {
    fn from(fault: DriverFault) -> Self {
        AppError::Driver { code: fault.code() }
    }
}

/// Fold a driver outcome into a command result: the handler ran, the
/// driver's verdict travels as the domain code.
pub fn driver_result(outcome: Result<(), DriverFault>) -> CommandResult {
    match outcome {
        Ok(()) => CommandResult::success(),
        Err(fault) => CommandResult::with_code(fault.code()),
    }
}

/// Command handler built from a fallible function of the packet. Parameter
/// errors short-circuit through `?` as an `ExecStatus`.
pub struct Handler<F>(pub F)
where
    F: FnMut(&CommandPacket) -> Result<CommandResult, ExecStatus>;

impl<F> CommandHandler for Handler<F>
where
    F: FnMut(&CommandPacket) -> Result<CommandResult, ExecStatus>,
{
    fn handle(&mut self, packet: &CommandPacket) -> CommandResult {
        (self.0)(packet).unwrap_or_else(CommandResult::from)
    }
}

pub fn cmd_nop(_packet: &CommandPacket) -> CommandResult {
    CommandResult::success()
}

/// Driver handles the services are built on.
#[derive(Clone)]
pub struct Drivers {
    pub adc: Rc<dyn AdcDriver>,
    pub thermometer: Rc<dyn ThermometerDriver>,
    pub gpio: Rc<dyn GpioDriver>,
    pub ramecc: Rc<dyn RameccDriver>,
    pub uart: Rc<dyn UartDriver>,
    pub iflash: Rc<dyn IflashDriver>,
    pub btmgr: Rc<dyn BootManager>,
    pub memory: Rc<dyn MemorySpace>,
}

/// Simulated board: one simulated driver per service, kept concrete so a
/// test or the SILS runner can poke and inspect it.
#[derive(Clone, Default)]
pub struct SimHardware {
    pub adc: Rc<SimAdc>,
    pub thermometer: Rc<SimThermometer>,
    pub gpio: Rc<SimGpio>,
    pub ramecc: Rc<SimRamecc>,
    pub uart: Rc<SimUart>,
    pub iflash: Rc<SimIflash>,
    pub btmgr: Rc<SimBootManager>,
    pub memory: Rc<SimMemory>,
}

impl SimHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drivers(&self) -> Drivers {
        Drivers {
            adc: self.adc.clone(),
            thermometer: self.thermometer.clone(),
            gpio: self.gpio.clone(),
            ramecc: self.ramecc.clone(),
            uart: self.uart.clone(),
            iflash: self.iflash.clone(),
            btmgr: self.btmgr.clone(),
            memory: self.memory.clone(),
        }
    }
}

/// Register every service App and command. App indices follow
/// `settings::APP_NAMES` order.
pub fn install_services(exec: &mut OnboardExecutive, drivers: &Drivers) -> Result<(), ExecutiveError> {
    exec.register_app(Box::new(adc::AdcService::new(drivers.adc.clone())))?;
    exec.register_app(Box::new(thermometer::ThermometerService::new(
        drivers.thermometer.clone(),
    )))?;
    exec.register_app(Box::new(gpio::GpioService::new(drivers.gpio.clone())))?;
    exec.register_app(Box::new(ramecc::RameccService::new(drivers.ramecc.clone())))?;
    exec.register_app(Box::new(uart::UartService::new(drivers.uart.clone())))?;
    exec.register_app(Box::new(iflash::IflashService::new(drivers.iflash.clone())))?;

    let dump = mem_dump::MemDumpService::new();
    let dump_buffer = dump.buffer();
    exec.register_app(Box::new(dump))?;

    exec.register_command(settings::CMD_NOP, cmd_nop)?;

    let gpio_driver = drivers.gpio.clone();
    exec.register_command(settings::CMD_GPIO_WRITE, move |packet: &CommandPacket| {
        gpio::cmd_gpio_write(gpio_driver.as_ref(), packet)
    })?;

    let ramecc_driver = drivers.ramecc.clone();
    exec.register_command(
        settings::CMD_RAMECC_SET_SCRUBBING_INTERVAL,
        Handler(move |packet: &CommandPacket| ramecc::cmd_set_scrubbing_interval(ramecc_driver.as_ref(), packet)),
    )?;

    let uart_driver = drivers.uart.clone();
    exec.register_command(
        settings::CMD_UART_REOPEN,
        Handler(move |packet: &CommandPacket| uart::cmd_uart_reopen(uart_driver.as_ref(), packet)),
    )?;

    let iflash_driver = drivers.iflash.clone();
    exec.register_command(settings::CMD_IFLASH_ERASE, move |packet: &CommandPacket| {
        iflash::cmd_iflash_erase(iflash_driver.as_ref(), packet)
    })?;
    let iflash_driver = drivers.iflash.clone();
    exec.register_command(
        settings::CMD_IFLASH_PROGRAM,
        Handler(move |packet: &CommandPacket| iflash::cmd_iflash_program(iflash_driver.as_ref(), packet)),
    )?;

    let btmgr_driver = drivers.btmgr.clone();
    exec.register_command(
        settings::CMD_BTMGR_SET_NEXT_BOOT_BANK,
        Handler(move |packet: &CommandPacket| btmgr::cmd_set_next_boot_bank(btmgr_driver.as_ref(), packet)),
    )?;
    let btmgr_driver = drivers.btmgr.clone();
    exec.register_command(settings::CMD_BTMGR_SYSTEM_RESET, move |packet: &CommandPacket| {
        btmgr::cmd_system_reset(btmgr_driver.as_ref(), packet)
    })?;

    let memory = drivers.memory.clone();
    exec.register_command(
        settings::CMD_APP_TMD_MEM_DUMP,
        Handler(move |packet: &CommandPacket| {
            mem_dump::cmd_mem_dump(memory.as_ref(), &dump_buffer, packet)
        }),
    )?;

    Ok(())
}

/// Command identifiers the services answer to.
pub fn command_ids() -> [CommandId; 9] {
    [
        settings::CMD_NOP,
        settings::CMD_BTMGR_SET_NEXT_BOOT_BANK,
        settings::CMD_BTMGR_SYSTEM_RESET,
        settings::CMD_GPIO_WRITE,
        settings::CMD_IFLASH_ERASE,
        settings::CMD_IFLASH_PROGRAM,
        settings::CMD_RAMECC_SET_SCRUBBING_INTERVAL,
        settings::CMD_UART_REOPEN,
        settings::CMD_APP_TMD_MEM_DUMP,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_maps_parameter_errors() {
        let mut handler = Handler(|packet: &CommandPacket| {
            let [value] = packet.params_exact::<1>()?;
            Ok(CommandResult::with_code(i32::from(value)))
        });

        let ok = CommandPacket::new(CommandId(1), &[7]).unwrap();
        assert_eq!(handler.handle(&ok), CommandResult::with_code(7));

        let short = CommandPacket::bare(CommandId(1));
        assert_eq!(handler.handle(&short), CommandResult::rejected(ExecStatus::IllegalLength));
    }

    #[test]
    fn test_driver_result_codes() {
        assert_eq!(driver_result(Ok(())), CommandResult::success());
        assert_eq!(driver_result(Err(DriverFault::Port(12))), CommandResult::with_code(-1));
        assert_eq!(AppError::from(DriverFault::Busy), AppError::Driver { code: -2 });
    }
}
