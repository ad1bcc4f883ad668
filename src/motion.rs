//! Motion interface consumed by the sequencer and the end effector. The
//! concrete implementation wraps a transport HAL, enforces the travel
//! envelope and caches the last position report; tests substitute doubles.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::motion_hal::{MachinePosition, MotionHal};

pub const POSITION_TOLERANCE_MM: f64 = 0.1;

pub trait Motion {
    /// Issue an absolute move. Idempotent: safe to re-issue every poll tick.
    fn move_to(&mut self, x: f64, y: f64, z: f64) -> anyhow::Result<()>;
    /// Refresh the believed position, then compare against the target.
    fn is_at(&mut self, x: f64, y: f64, z: f64, tolerance: f64) -> anyhow::Result<bool>;
    /// Last known position, without touching the hardware.
    fn position(&self) -> MachinePosition;
    fn tool_move_to(&mut self, position: f64) -> anyhow::Result<()>;
    /// Refresh and return the tool axis position.
    fn tool_position(&mut self) -> anyhow::Result<f64>;
    fn home(&mut self) -> anyhow::Result<()>;
    fn emergency_stop(&mut self) -> anyhow::Result<()>;
}

/// Permitted X/Y travel, in millimeters from machine zero. Z is left to the
/// controller's own endstops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelEnvelope {
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for TravelEnvelope {
    fn default() -> Self {
        Self { max_x: 310.0, max_y: 310.0 }
    }
}

impl TravelEnvelope {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x <= self.max_x && y <= self.max_y
    }
}

pub struct MotionController {
    hal: Box<dyn MotionHal>,
    envelope: TravelEnvelope,
    current: MachinePosition,
}

impl MotionController {
    pub fn new(hal: Box<dyn MotionHal>, envelope: TravelEnvelope) -> Self {
        Self { hal, envelope, current: MachinePosition::default() }
    }

    fn refresh(&mut self) -> anyhow::Result<()> {
        self.current = self.hal.query_position()?;
        Ok(())
    }
}

impl Motion for MotionController {
    fn move_to(&mut self, x: f64, y: f64, z: f64) -> anyhow::Result<()> {
        if !self.envelope.contains(x, y) {
            // Rejected, not fatal: the phase that asked for this will stall
            // until the operator fixes the configuration.
            warn!("move to X{x} Y{y} Z{z} rejected, outside travel envelope");
            return Ok(());
        }
        debug!("move to X{x} Y{y} Z{z}");
        self.hal.send_move(x, y, z)?;
        self.refresh()
    }

    fn is_at(&mut self, x: f64, y: f64, z: f64, tolerance: f64) -> anyhow::Result<bool> {
        self.refresh()?;
        Ok((self.current.x - x).abs() <= tolerance
            && (self.current.y - y).abs() <= tolerance
            && (self.current.z - z).abs() <= tolerance)
    }

    fn position(&self) -> MachinePosition {
        self.current
    }

    fn tool_move_to(&mut self, position: f64) -> anyhow::Result<()> {
        debug!("tool move to {position}");
        self.hal.send_tool_move(position)
    }

    fn tool_position(&mut self) -> anyhow::Result<f64> {
        self.refresh()?;
        Ok(self.current.tool)
    }

    fn home(&mut self) -> anyhow::Result<()> {
        self.hal.send_home()?;
        self.current = MachinePosition::default();
        Ok(())
    }

    fn emergency_stop(&mut self) -> anyhow::Result<()> {
        self.hal.send_stop()
    }
}
