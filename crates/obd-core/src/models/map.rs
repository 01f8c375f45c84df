//! Two-dimensional engine calibration maps

use serde::{Deserialize, Serialize};

/// Cells per map axis
pub const MAP_SIZE: usize = 16;

/// RPM step between adjacent x-axis breakpoints
pub const RPM_STEP: f64 = 500.0;

/// Load-percent step between adjacent y-axis breakpoints
pub const LOAD_STEP: f64 = 6.25;

/// Which calibration table a map holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    Fuel,
    Timing,
}

impl MapKind {
    pub const ALL: [MapKind; 2] = [MapKind::Fuel, MapKind::Timing];
}

impl std::fmt::Display for MapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapKind::Fuel => f.write_str("fuel"),
            MapKind::Timing => f.write_str("timing"),
        }
    }
}

/// A 16x16 calibration table indexed `values[row][col]`.
///
/// Cells that were never read stay at 0; a partially filled map is a valid
/// end state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineMap {
    pub x_axis: [f64; MAP_SIZE],
    pub y_axis: [f64; MAP_SIZE],
    pub values: [[f64; MAP_SIZE]; MAP_SIZE],
}

impl EngineMap {
    /// Map with populated axes and all-zero cells
    pub fn new() -> Self {
        let mut x_axis = [0.0; MAP_SIZE];
        let mut y_axis = [0.0; MAP_SIZE];
        for i in 0..MAP_SIZE {
            x_axis[i] = i as f64 * RPM_STEP;
            y_axis[i] = i as f64 * LOAD_STEP;
        }

        Self {
            x_axis,
            y_axis,
            values: [[0.0; MAP_SIZE]; MAP_SIZE],
        }
    }

    /// Store a cell value; out-of-range indices are ignored
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        if let Some(cell) = self.values.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Number of cells holding a non-zero value
    pub fn filled_cells(&self) -> usize {
        self.values
            .iter()
            .flat_map(|row| row.iter())
            .filter(|v| **v != 0.0)
            .count()
    }
}

impl Default for EngineMap {
    fn default() -> Self {
        Self::new()
    }
}

/// The fuel and timing maps read in one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineMaps {
    pub fuel: EngineMap,
    pub timing: EngineMap,
}

impl EngineMaps {
    pub fn get_mut(&mut self, kind: MapKind) -> &mut EngineMap {
        match kind {
            MapKind::Fuel => &mut self.fuel,
            MapKind::Timing => &mut self.timing,
        }
    }
}
