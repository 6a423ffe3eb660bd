//! # gridjam-collab — Real-time collaboration layer for GridJam
//!
//! Provides WebSocket-based multiplayer grid editing with room routing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ RoomClient  │ ◄─────────────────► │ GridServer  │
//! │ (per user)  │     Binary Proto    │ (central)   │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌─────────────┐
//! │ Grid + Log  │                     │ RoomStore   │
//! │ (replica)   │                     │ (authority) │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastGroup│
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded RoomMessage)
//! - [`room`] — Authoritative per-room grid + log + membership
//! - [`broadcast`] — Room-based fan-out with backpressure
//! - [`server`] — WebSocket grid server
//! - [`client`] — WebSocket room client
//!
//! Every toggle accepted by the server is broadcast to the whole room
//! (sender included) as a `NoteUpdate` plus a `HistoryAppend`, so each
//! connected client's action log stays a replica of the server's and
//! can drive replay locally via `gridjam-core`.

pub mod protocol;
pub mod room;
pub mod broadcast;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use protocol::{
    InitialStatePayload, MessageType, NoteUpdatePayload, ProtocolError, RoomInfoPayload,
    RoomMessage, RoomSummary, TogglePayload,
};
pub use room::{Room, RoomError, RoomStore};
pub use broadcast::{BroadcastGroup, BroadcastStats, RoomChannels};
pub use server::{GridServer, ServerConfig, ServerStats};
pub use client::{ConnectionState, RoomClient, RoomEvent};
