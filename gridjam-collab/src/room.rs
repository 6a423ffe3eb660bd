//! Room store: authoritative per-room grid + edit log + membership.
//!
//! Each room bundles a live grid, its append-only action log and the
//! set of connected users. The store keeps grid and log consistent:
//! every accepted toggle both mutates the grid and appends the
//! resulting cell value to the log, so the fold invariant (log folded
//! over an empty grid == live grid) holds at all times. Imports replace
//! grid and log together atomically and re-establish the invariant
//! against the new log.
//!
//! Rooms are created lazily on first reference and never removed —
//! empty rooms stay resident with their logs (retention policy is an
//! open product question; see DESIGN.md).

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use gridjam_core::{
    Action, ActionLog, CellValue, ExportDocument, Grid, GridConfig, GridError, ImportError,
};

use crate::protocol::RoomSummary;

/// Room-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// The named room does not exist and the operation requires one.
    RoomNotFound(String),
    /// Toggle addressed a cell outside the grid.
    InvalidPosition { row: usize, col: usize },
    /// Import document failed validation; no state was changed.
    Validation(ImportError),
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomError::RoomNotFound(name) => write!(f, "Room not found: {name}"),
            RoomError::InvalidPosition { row, col } => {
                write!(f, "Invalid position: row {row}, col {col}")
            }
            RoomError::Validation(e) => write!(f, "Import rejected: {e}"),
        }
    }
}

impl std::error::Error for RoomError {}

impl From<ImportError> for RoomError {
    fn from(e: ImportError) -> Self {
        RoomError::Validation(e)
    }
}

/// One room: grid, log, connected users.
pub struct Room {
    name: String,
    grid: Grid,
    log: ActionLog,
    users: HashSet<Uuid>,
}

impl Room {
    fn new(name: String, config: GridConfig) -> Self {
        Self {
            name,
            grid: Grid::empty(config),
            log: ActionLog::new(),
            users: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

/// Owns every room, in creation order.
///
/// Not a process-wide singleton: the server constructs one and passes
/// it explicitly, which keeps the store testable in isolation.
pub struct RoomStore {
    config: GridConfig,
    rooms: HashMap<String, Room>,
    /// Room names in creation order, for stable listings.
    order: Vec<String>,
}

impl RoomStore {
    pub fn new(config: GridConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn config(&self) -> GridConfig {
        self.config
    }

    /// Existing room, or a fresh one with an empty grid and empty log.
    /// Idempotent.
    pub fn get_or_create(&mut self, name: &str) -> &mut Room {
        if !self.rooms.contains_key(name) {
            log::info!("Room created: {name} (total {})", self.order.len() + 1);
            self.order.push(name.to_string());
        }
        let config = self.config;
        self.rooms
            .entry(name.to_string())
            .or_insert_with(|| Room::new(name.to_string(), config))
    }

    pub fn room_exists(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// User count of a room; 0 when the room is unknown.
    pub fn user_count(&self, name: &str) -> usize {
        self.rooms.get(name).map_or(0, |r| r.user_count())
    }

    /// Add a user to a room (creating it if needed); returns the new count.
    pub fn add_user(&mut self, name: &str, conn_id: Uuid) -> usize {
        let room = self.get_or_create(name);
        room.users.insert(conn_id);
        let count = room.users.len();
        log::debug!("{conn_id} joined {name} | users: {count}");
        count
    }

    /// Remove a user; returns the remaining count, or `None` when the
    /// room is unknown.
    pub fn remove_user(&mut self, name: &str, conn_id: &Uuid) -> Option<usize> {
        let room = self.rooms.get_mut(name)?;
        room.users.remove(conn_id);
        let remaining = room.users.len();
        log::debug!("{conn_id} left {name} | remaining: {remaining}");
        Some(remaining)
    }

    /// Toggle membership of `instrument` in a cell's instrument set and
    /// append the resulting value to the room's log.
    ///
    /// Fails with `RoomNotFound` for an unknown room and
    /// `InvalidPosition` for out-of-range coordinates; neither failure
    /// changes any state.
    pub fn apply_toggle(
        &mut self,
        name: &str,
        row: usize,
        col: usize,
        instrument: &str,
    ) -> Result<(CellValue, Action), RoomError> {
        let room = self
            .rooms
            .get_mut(name)
            .ok_or_else(|| RoomError::RoomNotFound(name.to_string()))?;

        let value = room.grid.toggle(row, col, instrument).map_err(
            |GridError::InvalidPosition { row, col }| RoomError::InvalidPosition { row, col },
        )?;
        let action = room.log.record(row, col, value.clone());
        Ok((value, action))
    }

    /// Validate an exported document and atomically replace the room's
    /// grid and log with its contents. The old log is replaced, not
    /// extended. The first failing check rejects the whole document
    /// with no partial mutation.
    pub fn import_state(&mut self, name: &str, document: ExportDocument) -> Result<(), RoomError> {
        let (grid, log) = document.into_state(self.config)?;
        let room = self.get_or_create(name);
        room.grid = grid;
        room.log = log;
        log::info!("Imported state into {name}: {} history entries", room.log.len());
        Ok(())
    }

    /// Snapshot a room's state as an export document.
    pub fn export_state(&self, name: &str) -> Option<ExportDocument> {
        let room = self.rooms.get(name)?;
        Some(ExportDocument::from_state(name, &room.grid, &room.log))
    }

    /// Snapshot of every room, in creation order.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.order
            .iter()
            .filter_map(|name| self.rooms.get(name))
            .map(|room| RoomSummary {
                name: room.name.clone(),
                users: room.users.len(),
            })
            .collect()
    }
}
