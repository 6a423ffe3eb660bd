//! Incremental reconstruction of historical grid states.
//!
//! `reconstruct(log, i)` answers "what did the grid look like after the
//! first `i + 1` actions?". A one-entry `(index, grid)` cache makes the
//! common replay pattern — monotonically increasing indices — O(1)
//! amortized: a forward step clones the cached grid and applies only the
//! delta actions. Backward jumps and cold starts rebuild from index 0.
//!
//! The cache must never leak across replay sessions: callers invalidate
//! it when a session starts or ends and whenever a full log replacement
//! arrives from the server (see [`crate::replay`]).

use crate::action::ActionLog;
use crate::grid::{Grid, GridConfig};

/// Log-to-grid reconstruction with a one-entry cache.
pub struct Reconstructor {
    config: GridConfig,
    /// Most recently produced (index, grid) pair.
    cache: Option<(usize, Grid)>,
}

impl Reconstructor {
    pub fn new(config: GridConfig) -> Self {
        Self { config, cache: None }
    }

    /// Index of the cached snapshot, if any.
    pub fn cached_index(&self) -> Option<usize> {
        self.cache.as_ref().map(|(i, _)| *i)
    }

    /// Clear the cached snapshot.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Grid state after applying actions `0 ..= target`.
    ///
    /// `target` beyond the log clamps to the last valid index; an empty
    /// log reconstructs to an all-empty grid at any index.
    pub fn reconstruct(&mut self, log: &ActionLog, target: usize) -> Grid {
        let last = match log.last_index() {
            Some(last) => last,
            None => return Grid::empty(self.config),
        };
        let target = target.min(last);

        let (start, mut grid) = match self.cache.take() {
            // Forward step: apply only the delta on top of the cache.
            Some((cached, grid)) if target > cached => (cached + 1, grid),
            // Backward jump or stale cache: rebuild from scratch.
            _ => (0, Grid::empty(self.config)),
        };

        for index in start..=target {
            if let Some(action) = log.get(index) {
                if grid.set(action.row, action.col, action.value.clone()).is_err() {
                    log::warn!(
                        "Skipping out-of-bounds action {index} at ({}, {})",
                        action.row,
                        action.col
                    );
                }
            }
        }

        self.cache = Some((target, grid.clone()));
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;

    /// Log of n toggles all hitting distinct columns of row 0.
    fn sample_log(n: usize) -> ActionLog {
        let config = GridConfig::default();
        let mut grid = Grid::empty(config);
        let mut log = ActionLog::new();
        for i in 0..n {
            let col = i % config.cols;
            let value = grid.toggle(0, col, "Synth").unwrap();
            log.record(0, col, value);
        }
        log
    }

    #[test]
    fn test_empty_log_reconstructs_blank() {
        let mut rec = Reconstructor::new(GridConfig::default());
        let log = ActionLog::new();
        assert!(rec.reconstruct(&log, 0).is_blank());
        assert!(rec.reconstruct(&log, 100).is_blank());
        assert!(rec.cached_index().is_none());
    }

    #[test]
    fn test_reconstruct_matches_prefix_fold() {
        let config = GridConfig::default();
        let log = sample_log(12);
        let mut rec = Reconstructor::new(config);

        for target in 0..log.len() {
            let expected = ActionLog::from_actions(log.as_slice()[..=target].to_vec()).fold(config);
            // Fresh reconstructor per target: no cache assistance
            let mut cold = Reconstructor::new(config);
            assert_eq!(cold.reconstruct(&log, target), expected);
            // Warm path must agree
            assert_eq!(rec.reconstruct(&log, target), expected);
        }
    }

    #[test]
    fn test_forward_scan_uses_cache() {
        let log = sample_log(8);
        let mut rec = Reconstructor::new(GridConfig::default());

        rec.reconstruct(&log, 2);
        assert_eq!(rec.cached_index(), Some(2));
        rec.reconstruct(&log, 5);
        assert_eq!(rec.cached_index(), Some(5));
    }

    #[test]
    fn test_backward_jump_rebuilds() {
        let config = GridConfig::default();
        let log = sample_log(8);
        let mut rec = Reconstructor::new(config);

        let at_six = rec.reconstruct(&log, 6);
        let at_two = rec.reconstruct(&log, 2);
        assert_eq!(rec.cached_index(), Some(2));

        let mut cold = Reconstructor::new(config);
        assert_eq!(cold.reconstruct(&log, 2), at_two);
        assert_ne!(at_six, at_two);
    }

    #[test]
    fn test_reconstruct_idempotent() {
        let log = sample_log(5);
        let mut rec = Reconstructor::new(GridConfig::default());
        let first = rec.reconstruct(&log, 3);
        let second = rec.reconstruct(&log, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_target_clamps_to_last_index() {
        let log = sample_log(4);
        let mut rec = Reconstructor::new(GridConfig::default());
        let last = rec.reconstruct(&log, 3);
        let beyond = rec.reconstruct(&log, 999);
        assert_eq!(last, beyond);
        assert_eq!(rec.cached_index(), Some(3));
    }

    #[test]
    fn test_invalidate_clears_cache() {
        let log = sample_log(4);
        let mut rec = Reconstructor::new(GridConfig::default());
        rec.reconstruct(&log, 2);
        rec.invalidate();
        assert!(rec.cached_index().is_none());
        // Still correct after invalidation
        let mut cold = Reconstructor::new(GridConfig::default());
        assert_eq!(rec.reconstruct(&log, 3), cold.reconstruct(&log, 3));
    }

    #[test]
    fn test_scenario_toggle_pair() {
        // toggle(3,5,"Synth") twice: index 0 shows the note, index 1 empty.
        let config = GridConfig::default();
        let mut grid = Grid::empty(config);
        let mut log = ActionLog::new();
        for _ in 0..2 {
            let value = grid.toggle(3, 5, "Synth").unwrap();
            log.record(3, 5, value);
        }

        let mut rec = Reconstructor::new(config);
        assert_eq!(
            rec.reconstruct(&log, 0).cell(3, 5).unwrap(),
            &CellValue::single("Synth")
        );
        assert_eq!(rec.reconstruct(&log, 1).cell(3, 5).unwrap(), &CellValue::Empty);
    }
}
