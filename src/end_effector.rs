//! End-effector model: a single linear motor that presses the pipette's
//! buttons. Targets are offsets from a calibrated neutral position; every
//! press or release is issue-then-confirm, one hardware round trip per call,
//! so the caller's poll loop never blocks.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::motion::Motion;

/// Beyond this offset from neutral the tool counts as pressing a button.
pub const PRESS_THRESHOLD_MM: f64 = 1.0;
const TOOL_TOLERANCE_MM: f64 = 0.1;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ToolState {
    Neutral,
    Pressed,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum PressKind {
    Full,
    Half,
    DropTip,
}

/// Calibrated travel for each button press, in motor millimeters relative to
/// neutral.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PressDeltas {
    pub full: f64,
    pub half: f64,
    pub drop_tip: f64,
}

impl Default for PressDeltas {
    fn default() -> Self {
        Self { full: -30.5, half: -17.5, drop_tip: 5.0 }
    }
}

pub struct EndEffector {
    neutral_position: f64,
    current_position: f64,
    state: ToolState,
    deltas: PressDeltas,
}

impl EndEffector {
    pub fn new(deltas: PressDeltas) -> Self {
        Self {
            neutral_position: 0.0,
            current_position: 0.0,
            state: ToolState::Neutral,
            deltas,
        }
    }

    /// Snapshot the current motor position as the new neutral. No motion.
    pub fn calibrate_neutral(&mut self, motion: &mut dyn Motion) -> anyhow::Result<()> {
        self.current_position = motion.tool_position()?;
        self.neutral_position = self.current_position;
        self.state = ToolState::Neutral;
        info!("tool neutral calibrated at {}", self.neutral_position);
        Ok(())
    }

    pub fn state(&self) -> ToolState {
        self.state
    }

    pub fn relative_position(&self) -> f64 {
        self.current_position - self.neutral_position
    }

    /// Logical state derived from the last queried position alone, for the
    /// display surface. `state()` is the confirmed view.
    pub fn observed_state(&self) -> ToolState {
        if self.relative_position().abs() > PRESS_THRESHOLD_MM {
            ToolState::Pressed
        } else {
            ToolState::Neutral
        }
    }

    fn press_target(&self, kind: PressKind) -> f64 {
        let delta = match kind {
            PressKind::Full => self.deltas.full,
            PressKind::Half => self.deltas.half,
            PressKind::DropTip => self.deltas.drop_tip,
        };
        self.neutral_position + delta
    }

    /// One press step: issue the move, refresh the position, report whether
    /// the button is confirmed down. `Ok(false)` is not an error; the caller
    /// simply polls again next tick.
    pub fn press(&mut self, kind: PressKind, motion: &mut dyn Motion) -> anyhow::Result<bool> {
        let confirmed = self.step_towards(self.press_target(kind), motion)?;
        if confirmed && self.state != ToolState::Pressed {
            debug!("tool press confirmed ({kind:?})");
            self.state = ToolState::Pressed;
        }
        Ok(confirmed)
    }

    /// One release step back to neutral, same contract as [`press`](Self::press).
    pub fn release(&mut self, motion: &mut dyn Motion) -> anyhow::Result<bool> {
        let confirmed = self.step_towards(self.neutral_position, motion)?;
        if confirmed && self.state != ToolState::Neutral {
            debug!("tool back at neutral");
            self.state = ToolState::Neutral;
        }
        Ok(confirmed)
    }

    fn step_towards(&mut self, target: f64, motion: &mut dyn Motion) -> anyhow::Result<bool> {
        motion.tool_move_to(target)?;
        self.current_position = motion.tool_position()?;
        Ok((self.current_position - target).abs() <= TOOL_TOLERANCE_MM)
    }
}
