//! # gridjam-core — Shared grid model for collaborative step sequencing
//!
//! Pure data structures and algorithms for the gridjam sequencer:
//! the room grid, its append-only edit log, incremental reconstruction
//! of historical grid states, and the client-side replay state machine.
//! No networking and no async — the transport layer lives in
//! `gridjam-collab`.
//!
//! ## Architecture
//!
//! ```text
//! toggle(row, col, instrument)
//!       │
//!       ▼
//! ┌─────────────┐   append    ┌─────────────┐
//! │    Grid     │ ──────────► │  ActionLog  │
//! │ (live state)│             │ (edit log)  │
//! └─────────────┘             └──────┬──────┘
//!                                    │ reconstruct(i)
//!                                    ▼
//!                            ┌───────────────┐
//!                            │ Reconstructor │ ── Grid @ index i
//!                            │ (1-entry cache)│
//!                            └──────┬────────┘
//!                                   │ frames
//!                                   ▼
//!                          ┌──────────────────┐
//!                          │ ReplayController │
//!                          │ LIVE/LINEAR/CYCLIC│
//!                          └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`grid`] — Grid, CellValue (set-membership instrument toggles)
//! - [`action`] — Action, ActionLog (append-only, fold invariant)
//! - [`reconstruct`] — incremental log-to-grid reconstruction
//! - [`export`] — JSON export/import document with legacy normalization
//! - [`replay`] — replay state machine + scheduler abstraction
//!
//! The central correctness property is the **fold invariant**: applying
//! every action of a room's log, in order, to an empty grid reproduces
//! the room's live grid exactly.

pub mod action;
pub mod export;
pub mod grid;
pub mod reconstruct;
pub mod replay;

pub use action::{Action, ActionLog};
pub use export::{ExportDocument, ImportError};
pub use grid::{
    CellValue, Grid, GridConfig, GridError, COLS, DEFAULT_INSTRUMENT, ROWS, ROW_LABELS,
};
pub use reconstruct::Reconstructor;
pub use replay::{ReplayController, ReplayFrame, ReplayMode, Scheduler, WrapOutcome};
