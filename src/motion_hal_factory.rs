use std::path::Path;

use log::info;

use crate::gcode_hal::GcodeMotionHal;
use crate::motion_hal::MotionHal;
use crate::motion_hal_mock::MotionHalMock;

pub struct MotionHalFactory {
    force_mock: bool,
    port: String,
    baud_rate: u32,
}

impl MotionHalFactory {
    pub fn new_maybe_mock(force_mock: bool, port: String, baud_rate: u32) -> Self {
        Self { force_mock, port, baud_rate }
    }

    pub fn create_hal(&self) -> anyhow::Result<Box<dyn MotionHal>> {
        if !self.force_mock && Path::new(&self.port).exists() {
            info!("using serial motion controller on {}", self.port);
            Ok(Box::new(GcodeMotionHal::connect(&self.port, self.baud_rate)?))
        } else {
            info!("no motion controller, using mock HAL");
            Ok(Box::new(MotionHalMock::new()))
        }
    }
}
