//! Serial G-code transport for Marlin-style motion controllers. One logical
//! operation per call: absolute move, tool-axis move, `M114` position query,
//! home, stop. Anything fancier than a single command/response round trip is
//! someone else's problem.

use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{trace, warn};

use crate::motion_hal::{MachinePosition, MotionHal};

const XYZ_FEED_RATE: u32 = 10800;
const TOOL_FEED_RATE: u32 = 500;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const RESPONSE_DEADLINE: Duration = Duration::from_secs(5);

pub struct GcodeMotionHal {
    port: Box<dyn serialport::SerialPort>,
    last_report: MachinePosition,
}

impl GcodeMotionHal {
    pub fn connect(path: &str, baud_rate: u32) -> anyhow::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("opening serial port {path}"))?;
        // Most controllers reset when the port opens; give the firmware a
        // moment before talking to it.
        thread::sleep(Duration::from_secs(2));
        Ok(Self { port, last_report: MachinePosition::default() })
    }

    fn send_line(&mut self, command: &str) -> anyhow::Result<()> {
        trace!("> {command}");
        self.port.write_all(command.as_bytes())?;
        self.port.write_all(b"\n")?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, deadline: Instant) -> anyhow::Result<Option<String>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while Instant::now() < deadline {
            match self.port.read(&mut byte) {
                Ok(0) => continue,
                Ok(_) => {
                    if byte[0] == b'\n' {
                        return Ok(Some(String::from_utf8_lossy(&line).trim().to_string()));
                    }
                    line.push(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

impl MotionHal for GcodeMotionHal {
    fn send_move(&mut self, x: f64, y: f64, z: f64) -> anyhow::Result<()> {
        // Moves ride on the extruder driver, so cold-extrusion checks are off.
        self.send_line("M302 S0")?;
        self.send_line(&format!("G1 X{x} Y{y} Z{z} F{XYZ_FEED_RATE}"))
    }

    fn send_tool_move(&mut self, position: f64) -> anyhow::Result<()> {
        self.send_line("M302 P1")?;
        self.send_line(&format!("G1 E{position} F{TOOL_FEED_RATE}"))
    }

    fn query_position(&mut self) -> anyhow::Result<MachinePosition> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        self.send_line("M114")?;
        let deadline = Instant::now() + RESPONSE_DEADLINE;
        let mut parsed = None;
        while let Some(line) = self.read_line(deadline)? {
            trace!("< {line}");
            if line == "ok" {
                break;
            }
            if parsed.is_none() {
                parsed = parse_m114(&line);
            }
        }
        match parsed {
            Some(report) => {
                self.last_report = report;
                Ok(report)
            }
            None => {
                // Treated like a transient hiccup: the caller keeps polling
                // against the last believed position.
                warn!("no position report within deadline, reusing last");
                Ok(self.last_report)
            }
        }
    }

    fn send_home(&mut self) -> anyhow::Result<()> {
        self.send_line("G28")
    }

    fn send_stop(&mut self) -> anyhow::Result<()> {
        self.send_line("M112")
    }
}

/// Parse a Marlin `M114` report line, e.g.
/// `X:10.00 Y:20.00 Z:5.00 E:0.00 Count X:800 Y:1600 Z:2000`.
/// Only the first occurrence of each axis counts; the trailing stepper counts
/// are ignored. Negative axis readings are clamped to zero.
fn parse_m114(line: &str) -> Option<MachinePosition> {
    let mut x = None;
    let mut y = None;
    let mut z = None;
    let mut tool = None;
    for token in line.split_whitespace() {
        if let Some(v) = token.strip_prefix("X:") {
            x = x.or_else(|| v.parse::<f64>().ok());
        } else if let Some(v) = token.strip_prefix("Y:") {
            y = y.or_else(|| v.parse::<f64>().ok());
        } else if let Some(v) = token.strip_prefix("Z:") {
            z = z.or_else(|| v.parse::<f64>().ok());
        } else if let Some(v) = token.strip_prefix("E:") {
            tool = tool.or_else(|| v.parse::<f64>().ok());
        }
    }
    match (x, y, z, tool) {
        (Some(x), Some(y), Some(z), Some(tool)) => Some(MachinePosition {
            x: x.max(0.0),
            y: y.max(0.0),
            z: z.max(0.0),
            tool,
        }),
        _ => None,
    }
}
