use alloc::rc::Rc;
use core::cell::Cell;

use serde::Serialize;

use super::DriverFault;
use crate::app::App;
use crate::error::AppResult;

pub trait ThermometerDriver {
    /// Board temperature in degrees Celsius.
    fn get_value(&self) -> Result<f32, DriverFault>;
}

#[derive(Debug)]
pub struct SimThermometer {
    temperature: Cell<f32>,
}

impl SimThermometer {
    pub fn set_temperature(&self, celsius: f32) {
        self.temperature.set(celsius);
    }
}

impl Default for SimThermometer {
    fn default() -> Self {
        Self {
            temperature: Cell::new(20.0),
        }
    }
}

impl ThermometerDriver for SimThermometer {
    fn get_value(&self) -> Result<f32, DriverFault> {
        Ok(self.temperature.get())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ThermometerInfo {
    pub temperature: f32,
}

pub struct ThermometerService {
    driver: Rc<dyn ThermometerDriver>,
    info: ThermometerInfo,
}

impl ThermometerService {
    pub fn new(driver: Rc<dyn ThermometerDriver>) -> Self {
        Self {
            driver,
            info: ThermometerInfo::default(),
        }
    }

    pub fn info(&self) -> &ThermometerInfo {
        &self.info
    }
}

impl App for ThermometerService {
    fn name(&self) -> &str {
        "update_thermometer"
    }

    fn init(&mut self) -> AppResult {
        Ok(())
    }

    fn update(&mut self) -> AppResult {
        self.info.temperature = self.driver.get_value()?;
        Ok(())
    }

    fn report(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self.info).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_reads_temperature() {
        let sensor = Rc::new(SimThermometer::default());
        let mut service = ThermometerService::new(sensor.clone());
        service.update().unwrap();
        assert_eq!(service.info().temperature, 20.0);

        sensor.set_temperature(-12.5);
        service.update().unwrap();
        assert_eq!(service.info().temperature, -12.5);
    }
}
