//! Bed model: the probe and tip grids plus the named Z-heights and tank
//! positions the sequencer moves between. The grids know where each slot is
//! (bilinear interpolation between four calibrated corners) and whether it
//! has been used yet.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// (row, column) address of one slot in a grid.
pub type SlotKey = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn lerp(self, other: Point, t: f64) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Four user-calibrated corners of a grid, in machine millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCorners {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum GridError {
    #[error("no slot at ({row}, {col})")]
    NotFound { row: usize, col: usize },
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub coordinates: Point,
    pub occupied: bool,
}

/// A quadrilateral grid of slots, filled row-major up to `active_count`.
///
/// Geometry is fixed at build time; changing the layout means rebuilding the
/// grid, which discards all occupancy.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    columns: usize,
    active_count: usize,
    slots: Vec<Slot>,
}

impl Grid {
    pub fn build(
        rows: usize,
        columns: usize,
        corners: GridCorners,
        active_count: usize,
    ) -> anyhow::Result<Grid> {
        if rows == 0 || columns == 0 {
            bail!("grid needs at least one row and one column (got {rows}x{columns})");
        }
        let active_count = active_count.min(rows * columns);
        let slots = (0..active_count)
            .map(|index| Slot {
                coordinates: interpolate(&corners, rows, columns, index / columns, index % columns),
                occupied: false,
            })
            .collect();
        Ok(Grid { rows, columns, active_count, slots })
    }

    /// An empty, unconfigured grid.
    pub fn unconfigured() -> Grid {
        Grid { rows: 0, columns: 0, active_count: 0, slots: Vec::new() }
    }

    fn slot_index(&self, row: usize, col: usize) -> Result<usize, GridError> {
        if row < self.rows && col < self.columns {
            let index = row * self.columns + col;
            if index < self.active_count {
                return Ok(index);
            }
        }
        Err(GridError::NotFound { row, col })
    }

    pub fn slot_coordinates(&self, row: usize, col: usize) -> Result<Point, GridError> {
        Ok(self.slots[self.slot_index(row, col)?].coordinates)
    }

    pub fn occupied(&self, row: usize, col: usize) -> Result<bool, GridError> {
        Ok(self.slots[self.slot_index(row, col)?].occupied)
    }

    pub fn set_occupied(&mut self, row: usize, col: usize, value: bool) -> Result<(), GridError> {
        let index = self.slot_index(row, col)?;
        self.slots[index].occupied = value;
        Ok(())
    }

    /// First slot in row-major order whose `occupied` bit is still false.
    /// The scan order is stable: the same key keeps coming back until it is
    /// marked, and `None` means the grid is exhausted (or empty).
    pub fn next_unfilled(&self) -> Option<SlotKey> {
        self.slots
            .iter()
            .position(|slot| !slot.occupied)
            .map(|index| (index / self.columns, index % self.columns))
    }

    pub fn is_configured(&self) -> bool {
        self.rows > 0 && self.columns > 0 && self.active_count > 0
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Row-major view of every active slot, for the display surface.
    pub fn slots(&self) -> impl Iterator<Item = (SlotKey, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| ((index / self.columns, index % self.columns), slot))
    }

    /// Explicit operator reset. The sequencer itself never unsets a slot.
    pub fn clear_occupancy(&mut self) {
        for slot in &mut self.slots {
            slot.occupied = false;
        }
    }
}

fn interpolate(corners: &GridCorners, rows: usize, columns: usize, row: usize, col: usize) -> Point {
    let u = if columns > 1 { col as f64 / (columns - 1) as f64 } else { 0.0 };
    let t = if rows > 1 { row as f64 / (rows - 1) as f64 } else { 0.0 };
    let top = corners.top_left.lerp(corners.top_right, u);
    let bottom = corners.bottom_left.lerp(corners.bottom_right, u);
    top.lerp(bottom, t)
}

/// Named process heights and tank positions. Owned alongside the grids,
/// read-only to the sequencer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BedLayout {
    pub safe_z: f64,
    pub dispensing_z: f64,
    pub change_tip_z: f64,
    pub drop_tip_z: f64,
    pub refilling_z: f64,
    pub refilling_tank: Point,
    pub disposal_tank: Point,
}

impl Default for BedLayout {
    fn default() -> Self {
        Self {
            safe_z: 35.0,
            dispensing_z: 30.0,
            change_tip_z: 5.0,
            drop_tip_z: 20.0,
            refilling_z: 30.0,
            refilling_tank: Point::new(200.0, 200.0),
            disposal_tank: Point::new(250.0, 200.0),
        }
    }
}

#[derive(Debug, Clone, derive_new::new)]
pub struct Bed {
    pub probes: Grid,
    pub tips: Grid,
    pub layout: BedLayout,
}
