pub mod bed;
pub mod config;
pub mod end_effector;
pub mod gcode_hal;
pub mod motion;
pub mod motion_hal;
pub mod motion_hal_factory;
pub mod motion_hal_mock;
pub mod runner;
pub mod sequencer;
