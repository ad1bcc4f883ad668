//! Plain-data configuration consumed at construction time: grid geometry,
//! bed layout, press deltas, travel limits, serial parameters. Loaded from a
//! JSON file when one is given; every field has a usable default.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::bed::{Bed, BedLayout, Grid, GridCorners, Point};
use crate::end_effector::PressDeltas;
use crate::motion::TravelEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub columns: usize,
    pub active_count: usize,
    pub corners: GridCorners,
}

impl GridConfig {
    fn with_origin(origin: Point, pitch: f64, rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            active_count: rows * columns,
            corners: GridCorners {
                top_left: origin,
                top_right: Point::new(origin.x + pitch * (columns - 1) as f64, origin.y),
                bottom_left: Point::new(origin.x, origin.y + pitch * (rows - 1) as f64),
                bottom_right: Point::new(
                    origin.x + pitch * (columns - 1) as f64,
                    origin.y + pitch * (rows - 1) as f64,
                ),
            },
        }
    }

    pub fn build_grid(&self) -> anyhow::Result<Grid> {
        Grid::build(self.rows, self.columns, self.corners, self.active_count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipetteerConfig {
    pub probes: GridConfig,
    pub tips: GridConfig,
    pub layout: BedLayout,
    pub press_deltas: PressDeltas,
    pub travel: TravelEnvelope,
    pub serial_port: String,
    pub baud_rate: u32,
}

impl Default for PipetteerConfig {
    fn default() -> Self {
        Self {
            probes: GridConfig::with_origin(Point::new(40.0, 40.0), 15.0, 3, 3),
            tips: GridConfig::with_origin(Point::new(40.0, 150.0), 15.0, 3, 3),
            layout: BedLayout::default(),
            press_deltas: PressDeltas::default(),
            travel: TravelEnvelope::default(),
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
        }
    }
}

impl PipetteerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn build_bed(&self) -> anyhow::Result<Bed> {
        Ok(Bed::new(
            self.probes.build_grid()?,
            self.tips.build_grid()?,
            self.layout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_usable_bed() {
        let bed = PipetteerConfig::default().build_bed().unwrap();
        assert!(bed.probes.is_configured());
        assert!(bed.tips.is_configured());
        assert_eq!(bed.probes.next_unfilled(), Some((0, 0)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipetteerConfig = serde_json::from_str(
            r#"{
                "probes": {
                    "rows": 2,
                    "columns": 2,
                    "active_count": 3,
                    "corners": {
                        "top_left": {"x": 0.0, "y": 0.0},
                        "top_right": {"x": 10.0, "y": 0.0},
                        "bottom_left": {"x": 0.0, "y": 10.0},
                        "bottom_right": {"x": 10.0, "y": 10.0}
                    }
                },
                "serial_port": "/dev/ttyACM0"
            }"#,
        )
        .unwrap();
        assert_eq!(config.probes.active_count, 3);
        assert_eq!(config.serial_port, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.layout.safe_z, 35.0);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = PipetteerConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: PipetteerConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.probes.rows, config.probes.rows);
        assert_eq!(back.travel.max_x, config.travel.max_x);
    }
}
