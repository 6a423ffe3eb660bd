//! The sequencer grid and its cell values.
//!
//! A grid is a fixed-size R×C matrix. Each cell is either empty or holds
//! a set of instrument identifiers active at that step. Historical
//! payloads used a plain 0/1 per cell; that form is normalized to a
//! singleton set at the import boundary (see [`crate::export`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of grid rows (8 melodic + 2 percussion).
pub const ROWS: usize = 10;

/// Number of grid columns (steps in the sequencer).
pub const COLS: usize = 32;

/// Instrument assigned to legacy 0/1 cells on import.
pub const DEFAULT_INSTRUMENT: &str = "Synth";

/// Row labels in the reference configuration.
pub const ROW_LABELS: [&str; ROWS] = [
    "C5", "A4", "G4", "E4", "D4", "C4", "A3", "G3", "SNARE", "KICK",
];

/// Grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { rows: ROWS, cols: COLS }
    }
}

/// One grid cell: empty, or the set of instruments active at this step.
///
/// Invariant: an `Instruments` set is never empty — removing the last
/// instrument collapses the cell back to `Empty`. Instrument ids are
/// unique and unordered; `BTreeSet` gives canonical equality and a
/// stable serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Instruments(BTreeSet<String>),
}

impl CellValue {
    /// Cell with a single active instrument.
    pub fn single(instrument: impl Into<String>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(instrument.into());
        CellValue::Instruments(set)
    }

    /// Whether anything is active at this step.
    pub fn is_active(&self) -> bool {
        matches!(self, CellValue::Instruments(_))
    }

    /// The active instrument set, if any.
    pub fn instruments(&self) -> Option<&BTreeSet<String>> {
        match self {
            CellValue::Empty => None,
            CellValue::Instruments(set) => Some(set),
        }
    }

    /// Whether the given instrument is active in this cell.
    pub fn contains(&self, instrument: &str) -> bool {
        self.instruments().is_some_and(|set| set.contains(instrument))
    }

    /// Set-membership toggle: insert the instrument if absent, remove it
    /// if present. Returns the resulting value; a set emptied by removal
    /// collapses to `Empty`.
    pub fn toggled(&self, instrument: &str) -> CellValue {
        let mut set = match self {
            CellValue::Empty => BTreeSet::new(),
            CellValue::Instruments(set) => set.clone(),
        };
        if !set.remove(instrument) {
            set.insert(instrument.to_string());
        }
        if set.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Instruments(set)
        }
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

/// Grid errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Row/col outside the configured dimensions.
    InvalidPosition { row: usize, col: usize },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::InvalidPosition { row, col } => {
                write!(f, "Invalid position: row {row}, col {col}")
            }
        }
    }
}

impl std::error::Error for GridError {}

/// The R×C sequencer grid.
///
/// Value-semantic: `clone()` produces an independent copy — the
/// reconstructor relies on this for its cached snapshot, and nothing in
/// the crate aliases grid internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    config: GridConfig,
    cells: Vec<Vec<CellValue>>,
}

impl Grid {
    /// All-empty grid with the given dimensions.
    pub fn empty(config: GridConfig) -> Self {
        let cells = vec![vec![CellValue::Empty; config.cols]; config.rows];
        Self { config, cells }
    }

    /// Build a grid from raw cells. The caller is responsible for shape
    /// validation (see [`crate::export::ExportDocument::into_state`]).
    pub(crate) fn from_cells(config: GridConfig, cells: Vec<Vec<CellValue>>) -> Self {
        Self { config, cells }
    }

    pub fn config(&self) -> GridConfig {
        self.config
    }

    pub fn rows(&self) -> usize {
        self.config.rows
    }

    pub fn cols(&self) -> usize {
        self.config.cols
    }

    /// The raw cell matrix, row-major.
    pub fn cells(&self) -> &[Vec<CellValue>] {
        &self.cells
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<(), GridError> {
        if row >= self.config.rows || col >= self.config.cols {
            return Err(GridError::InvalidPosition { row, col });
        }
        Ok(())
    }

    /// Cell at (row, col), or an error when out of range.
    pub fn cell(&self, row: usize, col: usize) -> Result<&CellValue, GridError> {
        self.check_bounds(row, col)?;
        Ok(&self.cells[row][col])
    }

    /// Overwrite a cell.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) -> Result<(), GridError> {
        self.check_bounds(row, col)?;
        self.cells[row][col] = value;
        Ok(())
    }

    /// Toggle membership of `instrument` in the cell's instrument set.
    /// Returns the resulting cell value.
    pub fn toggle(
        &mut self,
        row: usize,
        col: usize,
        instrument: &str,
    ) -> Result<CellValue, GridError> {
        self.check_bounds(row, col)?;
        let next = self.cells[row][col].toggled(instrument);
        self.cells[row][col] = next.clone();
        Ok(next)
    }

    /// Whether every cell is empty.
    pub fn is_blank(&self) -> bool {
        self.cells
            .iter()
            .all(|row| row.iter().all(|c| !c.is_active()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_grid_dimensions() {
        let grid = Grid::empty(GridConfig::default());
        assert_eq!(grid.rows(), 10);
        assert_eq!(grid.cols(), 32);
        assert!(grid.is_blank());
    }

    #[test]
    fn test_cell_toggle_inserts_and_removes() {
        let cell = CellValue::Empty;
        let on = cell.toggled("Synth");
        assert_eq!(on, CellValue::single("Synth"));
        assert!(on.is_active());
        assert!(on.contains("Synth"));

        let off = on.toggled("Synth");
        assert_eq!(off, CellValue::Empty);
        assert!(!off.is_active());
    }

    #[test]
    fn test_cell_multiple_instruments() {
        let cell = CellValue::Empty.toggled("Synth").toggled("Kick");
        let set = cell.instruments().unwrap();
        assert_eq!(set.len(), 2);
        assert!(cell.contains("Synth"));
        assert!(cell.contains("Kick"));

        // Removing one leaves the other
        let cell = cell.toggled("Synth");
        assert!(!cell.contains("Synth"));
        assert!(cell.contains("Kick"));
    }

    #[test]
    fn test_last_removal_collapses_to_empty() {
        let cell = CellValue::single("Kick").toggled("Kick");
        assert_eq!(cell, CellValue::Empty);
        // Never an empty Instruments set
        assert!(cell.instruments().is_none());
    }

    #[test]
    fn test_grid_toggle_returns_new_value() {
        let mut grid = Grid::empty(GridConfig::default());
        let value = grid.toggle(3, 5, "Synth").unwrap();
        assert_eq!(value, CellValue::single("Synth"));
        assert_eq!(grid.cell(3, 5).unwrap(), &CellValue::single("Synth"));

        let value = grid.toggle(3, 5, "Synth").unwrap();
        assert_eq!(value, CellValue::Empty);
        assert!(grid.is_blank());
    }

    #[test]
    fn test_grid_bounds_checked() {
        let mut grid = Grid::empty(GridConfig::default());
        assert_eq!(
            grid.toggle(10, 0, "Synth"),
            Err(GridError::InvalidPosition { row: 10, col: 0 })
        );
        assert_eq!(
            grid.toggle(0, 32, "Synth"),
            Err(GridError::InvalidPosition { row: 0, col: 32 })
        );
        assert!(grid.cell(9, 31).is_ok());
    }

    #[test]
    fn test_grid_clone_is_independent() {
        let mut grid = Grid::empty(GridConfig::default());
        grid.toggle(0, 0, "Synth").unwrap();
        let snapshot = grid.clone();
        grid.toggle(0, 0, "Synth").unwrap();

        assert!(grid.is_blank());
        assert!(snapshot.cell(0, 0).unwrap().is_active());
    }

    #[test]
    fn test_grid_error_display() {
        let err = GridError::InvalidPosition { row: 12, col: 40 };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("40"));
    }
}
