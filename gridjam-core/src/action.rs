//! The append-only edit log.
//!
//! Every accepted toggle becomes one [`Action`] recording the cell it
//! touched and the value the cell holds *after* the edit. The log is the
//! authoritative history of a room: folding it over an empty grid, in
//! order, reproduces the room's live grid exactly (the fold invariant).
//! Replay reconstruction is a prefix of that fold — see
//! [`crate::reconstruct`].

use serde::{Deserialize, Serialize};

use crate::grid::{CellValue, Grid, GridConfig, GridError};

/// One atomic edit: the resulting cell value at (row, col).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub row: usize,
    pub col: usize,
    /// Cell value after the edit (not the delta).
    pub value: CellValue,
    /// Logical timestamp: position in the log at append time.
    pub timestamp: u64,
}

/// Ordered, append-only sequence of actions scoped to one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a validated action sequence (import path).
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Index of the newest action, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.actions.len().checked_sub(1)
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    /// Append a pre-built action (client side, extending from a
    /// server-pushed delta).
    pub fn append(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Record a new edit with the next logical timestamp (server side).
    pub fn record(&mut self, row: usize, col: usize, value: CellValue) -> Action {
        let action = Action {
            row,
            col,
            value,
            timestamp: self.actions.len() as u64,
        };
        self.actions.push(action.clone());
        action
    }

    /// Check every action is within bounds for the given dimensions.
    /// Returns the index and position of the first violation.
    pub fn validate(&self, config: GridConfig) -> Result<(), (usize, GridError)> {
        for (i, action) in self.actions.iter().enumerate() {
            if action.row >= config.rows || action.col >= config.cols {
                return Err((
                    i,
                    GridError::InvalidPosition {
                        row: action.row,
                        col: action.col,
                    },
                ));
            }
        }
        Ok(())
    }

    /// Fold the full log over an empty grid. This is the reference
    /// semantics the incremental reconstructor must agree with.
    pub fn fold(&self, config: GridConfig) -> Grid {
        let mut grid = Grid::empty(config);
        for action in &self.actions {
            if grid.set(action.row, action.col, action.value.clone()).is_err() {
                log::warn!(
                    "Skipping out-of-bounds action at ({}, {})",
                    action.row,
                    action.col
                );
            }
        }
        grid
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_assigns_logical_timestamps() {
        let mut log = ActionLog::new();
        let a0 = log.record(1, 2, CellValue::single("Synth"));
        let a1 = log.record(1, 2, CellValue::Empty);

        assert_eq!(a0.timestamp, 0);
        assert_eq!(a1.timestamp, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_index(), Some(1));
    }

    #[test]
    fn test_fold_reproduces_grid() {
        let config = GridConfig::default();
        let mut grid = Grid::empty(config);
        let mut log = ActionLog::new();

        for (row, col, instrument) in [(0, 0, "Synth"), (3, 5, "Kick"), (0, 0, "Synth")] {
            let value = grid.toggle(row, col, instrument).unwrap();
            log.record(row, col, value);
        }

        assert_eq!(log.fold(config), grid);
    }

    #[test]
    fn test_fold_empty_log_is_blank_grid() {
        let config = GridConfig::default();
        let log = ActionLog::new();
        assert!(log.fold(config).is_blank());
    }

    #[test]
    fn test_validate_rejects_out_of_bounds() {
        let config = GridConfig::default();
        let log = ActionLog::from_actions(vec![
            Action { row: 0, col: 0, value: CellValue::Empty, timestamp: 0 },
            Action { row: 10, col: 0, value: CellValue::Empty, timestamp: 1 },
        ]);

        let (index, err) = log.validate(config).unwrap_err();
        assert_eq!(index, 1);
        assert_eq!(err, GridError::InvalidPosition { row: 10, col: 0 });
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let config = GridConfig::default();
        let mut log = ActionLog::new();
        log.record(9, 31, CellValue::single("Kick"));
        assert!(log.validate(config).is_ok());
    }
}
