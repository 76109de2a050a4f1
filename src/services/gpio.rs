use alloc::rc::Rc;
use core::cell::RefCell;

use serde::{Deserialize, Serialize};

use super::{driver_result, DriverFault};
use crate::app::App;
use crate::error::AppResult;
use crate::protocol::{CommandPacket, CommandResult};

pub const GPIO_OUTPUTS: usize = 9;
pub const GPIO_INPUTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl TryFrom<u8> for Level {
    type Error = DriverFault;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            _ => Err(DriverFault::Logic),
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> Self {
        level == Level::High
    }
}

pub trait GpioDriver {
    fn set_output(&self, port: u8, level: Level) -> Result<(), DriverFault>;
    fn get_output(&self, port: u8) -> Result<Level, DriverFault>;
    fn get_input(&self, port: u8) -> Result<Level, DriverFault>;
}

#[derive(Debug, Default)]
pub struct SimGpio {
    outputs: RefCell<[Level; GPIO_OUTPUTS]>,
    inputs: RefCell<[Level; GPIO_INPUTS]>,
}

impl SimGpio {
    pub fn drive_input(&self, port: u8, level: Level) -> Result<(), DriverFault> {
        let mut inputs = self.inputs.borrow_mut();
        let slot = inputs.get_mut(port as usize).ok_or(DriverFault::Port(port))?;
        *slot = level;
        Ok(())
    }
}

impl GpioDriver for SimGpio {
    fn set_output(&self, port: u8, level: Level) -> Result<(), DriverFault> {
        let mut outputs = self.outputs.borrow_mut();
        let slot = outputs.get_mut(port as usize).ok_or(DriverFault::Port(port))?;
        *slot = level;
        Ok(())
    }

    fn get_output(&self, port: u8) -> Result<Level, DriverFault> {
        self.outputs
            .borrow()
            .get(port as usize)
            .copied()
            .ok_or(DriverFault::Port(port))
    }

    fn get_input(&self, port: u8) -> Result<Level, DriverFault> {
        self.inputs
            .borrow()
            .get(port as usize)
            .copied()
            .ok_or(DriverFault::Port(port))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GpioInfo {
    pub outputs: [bool; GPIO_OUTPUTS],
    pub inputs: [bool; GPIO_INPUTS],
}

/// App `update_gpio`: mirrors every pin into telemetry.
pub struct GpioService {
    driver: Rc<dyn GpioDriver>,
    info: GpioInfo,
}

impl GpioService {
    pub fn new(driver: Rc<dyn GpioDriver>) -> Self {
        Self {
            driver,
            info: GpioInfo::default(),
        }
    }

    pub fn info(&self) -> &GpioInfo {
        &self.info
    }
}

impl App for GpioService {
    fn name(&self) -> &str {
        "update_gpio"
    }

    fn init(&mut self) -> AppResult {
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        for (port, pin) in self.info.outputs.iter_mut().enumerate() {
            *pin = self.driver.get_output(port as u8)?.into();
        }
        for (port, pin) in self.info.inputs.iter_mut().enumerate() {
            *pin = self.driver.get_input(port as u8)?.into();
        }
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.info).ok()
    }
}

/// `GPIO_WRITE(pin: u8, value: u8)`. A value other than 0/1 is a driver
/// logic error, not a parameter error.
pub fn cmd_gpio_write(driver: &dyn GpioDriver, packet: &CommandPacket) -> CommandResult {
    let [pin, value] = match packet.params_exact::<2>() {
        Ok(params) => params,
        Err(exec) => return CommandResult::rejected(exec),
    };

    match Level::try_from(value) {
        Ok(level) => driver_result(driver.set_output(pin, level)),
        Err(fault) => CommandResult::with_code(fault.code()),
    }
}
