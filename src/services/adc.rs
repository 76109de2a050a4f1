use alloc::rc::Rc;
use core::cell::Cell;

use serde::Serialize;

use super::DriverFault;
use crate::app::App;
use crate::error::AppResult;

pub const ADC_INPUT_CHANNELS: usize = 3;
pub const ADC_TEST_CHANNELS: usize = 2;
/// Full scale of the 12-bit converter.
pub const ADC_FULL_SCALE: u16 = 0x0FFF;

pub trait AdcDriver {
    fn get_value(&self, channel: u8) -> Result<u16, DriverFault>;

    /// Internal reference channels: 0 reads half scale, 1 reads full scale.
    fn get_test_value(&self, channel: u8) -> Result<u16, DriverFault>;
}

#[derive(Debug, Default)]
pub struct SimAdc {
    values: Cell<[u16; ADC_INPUT_CHANNELS]>,
}

impl SimAdc {
    pub fn set_value(&self, channel: u8, value: u16) -> Result<(), DriverFault> {
        let mut values = self.values.get();
        let slot = values.get_mut(channel as usize).ok_or(DriverFault::Port(channel))?;
        *slot = value.min(ADC_FULL_SCALE);
        self.values.set(values);
        Ok(())
    }
}

impl AdcDriver for SimAdc {
    fn get_value(&self, channel: u8) -> Result<u16, DriverFault> {
        self.values
            .get()
            .get(channel as usize)
            .copied()
            .ok_or(DriverFault::Port(channel))
    }

    fn get_test_value(&self, channel: u8) -> Result<u16, DriverFault> {
        match channel {
            0 => Ok(ADC_FULL_SCALE / 2),
            1 => Ok(ADC_FULL_SCALE),
            _ => Err(DriverFault::Port(channel)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AdcInfo {
    pub channels: [u16; ADC_INPUT_CHANNELS],
    pub half_of_max: u16,
    pub full_of_max: u16,
}

/// App `update_adc`: samples every input and reference channel.
pub struct AdcService {
    driver: Rc<dyn AdcDriver>,
    info: AdcInfo,
}

impl AdcService {
    pub fn new(driver: Rc<dyn AdcDriver>) -> Self {
        Self {
            driver,
            info: AdcInfo::default(),
        }
    }

    pub fn info(&self) -> &AdcInfo {
        &self.info
    }
}

impl App for AdcService {
    fn name(&self) -> &str {
        "update_adc"
    }

    fn init(&mut self) -> AppResult {
        self.info = AdcInfo::default();
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        for (channel, value) in self.info.channels.iter_mut().enumerate() {
            *value = self.driver.get_value(channel as u8)?;
        }
        self.info.half_of_max = self.driver.get_test_value(0)?;
        self.info.full_of_max = self.driver.get_test_value(1)?;
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.info).ok()
    }
}
