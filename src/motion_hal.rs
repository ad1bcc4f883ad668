/// Last reported absolute position of every axis, in machine units. The tool
/// axis is the linear actuator riding on the carriage.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MachinePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub tool: f64,
}

/// Raw transport to the motion controller: one command per call, no waiting.
/// Framing and wire protocol live behind this trait.
pub trait MotionHal {
    fn send_move(&mut self, x: f64, y: f64, z: f64) -> anyhow::Result<()>;
    fn send_tool_move(&mut self, position: f64) -> anyhow::Result<()>;
    fn query_position(&mut self) -> anyhow::Result<MachinePosition>;
    fn send_home(&mut self) -> anyhow::Result<()>;
    fn send_stop(&mut self) -> anyhow::Result<()>;
}
