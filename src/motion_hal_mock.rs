use log::trace;

use crate::motion_hal::{MachinePosition, MotionHal};

/// In-memory stand-in for the motion controller. Arrives at any target after
/// `lag_ticks` position queries, which is enough to exercise the sequencer's
/// confirmation polling without hardware attached.
#[derive(Debug, Default)]
pub struct MotionHalMock {
    reported: MachinePosition,
    target: MachinePosition,
    lag_ticks: u32,
    ticks_remaining: u32,
}

impl MotionHalMock {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_lag(lag_ticks: u32) -> Self {
        Self { lag_ticks, ..Default::default() }
    }
}

impl MotionHal for MotionHalMock {
    fn send_move(&mut self, x: f64, y: f64, z: f64) -> anyhow::Result<()> {
        let next = MachinePosition { x, y, z, tool: self.target.tool };
        if next != self.target {
            trace!("mock move: X{x} Y{y} Z{z}");
            self.target = next;
            self.ticks_remaining = self.lag_ticks;
        }
        Ok(())
    }

    fn send_tool_move(&mut self, position: f64) -> anyhow::Result<()> {
        if self.target.tool != position {
            trace!("mock tool move: {position}");
            self.target.tool = position;
            self.ticks_remaining = self.lag_ticks;
        }
        Ok(())
    }

    fn query_position(&mut self) -> anyhow::Result<MachinePosition> {
        if self.ticks_remaining > 0 {
            self.ticks_remaining -= 1;
        } else {
            self.reported = self.target;
        }
        Ok(self.reported)
    }

    fn send_home(&mut self) -> anyhow::Result<()> {
        trace!("mock home");
        self.target = MachinePosition::default();
        self.reported = self.target;
        Ok(())
    }

    fn send_stop(&mut self) -> anyhow::Result<()> {
        trace!("mock stop");
        // Halt in place: whatever was reported last is where we stay.
        self.target = self.reported;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrival_is_delayed_by_lag() {
        let mut mock = MotionHalMock::with_lag(2);
        mock.send_move(5.0, 5.0, 5.0).unwrap();
        assert_eq!(mock.query_position().unwrap().x, 0.0);
        assert_eq!(mock.query_position().unwrap().x, 0.0);
        assert_eq!(mock.query_position().unwrap().x, 5.0);
    }

    #[test]
    fn reissuing_the_same_move_does_not_reset_lag() {
        let mut mock = MotionHalMock::with_lag(1);
        mock.send_move(5.0, 5.0, 5.0).unwrap();
        mock.query_position().unwrap();
        mock.send_move(5.0, 5.0, 5.0).unwrap();
        assert_eq!(mock.query_position().unwrap().x, 5.0);
    }
}
