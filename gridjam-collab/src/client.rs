//! WebSocket client for connecting to the grid server.
//!
//! Provides:
//! - Connection lifecycle (connect, event stream, disconnect detection)
//! - Room join/switch and toggle sending
//! - Import upload and room-list queries
//!
//! The client keeps no grid of its own; it surfaces decoded server
//! messages as [`RoomEvent`]s and lets the application hold state.
//! Room broadcasts are echoed back to the sender, so after a toggle the
//! application appends its own edit to the local log the same way it
//! appends everyone else's.

use std::sync::Arc;
use futures_util::StreamExt;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use gridjam_core::{Action, ActionLog, CellValue, Grid};

use crate::protocol::{MessageType, ProtocolError, RoomMessage, RoomSummary};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the room client.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Full room state after a join or an import
    InitialState { room: String, grid: Grid, history: ActionLog },
    /// A cell changed in the joined room
    NoteUpdate { row: usize, col: usize, value: CellValue },
    /// One action appended to the joined room's log
    HistoryAppend(Action),
    /// Member count of a room changed
    UserCount { room: String, count: usize },
    /// Fresh room list, in creation order
    RoomList(Vec<RoomSummary>),
    /// Reply to a room existence query
    RoomInfo { room: String, exists: bool, user_count: usize },
    /// Heartbeat reply
    Pong,
}

/// The room client.
///
/// Manages a WebSocket connection to the grid server and decodes
/// incoming messages into [`RoomEvent`]s.
pub struct RoomClient {
    /// Our connection identity (stamped on outgoing messages)
    conn_id: Uuid,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Room this client has joined, if any
    current_room: Arc<RwLock<Option<String>>>,

    /// Channel to send messages to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<RoomEvent>>,

    /// Event sender (held by connection task)
    event_tx: mpsc::Sender<RoomEvent>,

    /// Server URL
    server_url: String,
}

impl RoomClient {
    /// Create a new room client.
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            conn_id: Uuid::new_v4(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            current_room: Arc::new(RwLock::new(None)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<RoomEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_result = tokio_tungstenite::connect_async(&self.server_url).await;

        match ws_result {
            Ok((ws_stream, _)) => {
                let (ws_writer, mut ws_reader) = futures_util::StreamExt::split(ws_stream);

                // Outgoing message channel
                let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
                self.outgoing_tx = Some(out_tx);

                // Writer task: forward outgoing channel to WebSocket
                let writer = Arc::new(tokio::sync::Mutex::new(ws_writer));
                tokio::spawn(async move {
                    while let Some(data) = out_rx.recv().await {
                        let mut w = writer.lock().await;
                        use futures_util::SinkExt;
                        if w.send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                });

                *self.state.write().await = ConnectionState::Connected;
                let _ = self.event_tx.send(RoomEvent::Connected).await;

                // Reader task: decode incoming messages into events
                let event_tx = self.event_tx.clone();
                let state = self.state.clone();
                tokio::spawn(async move {
                    while let Some(msg) = ws_reader.next().await {
                        match msg {
                            Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                                let bytes: Vec<u8> = data.into();
                                if let Ok(room_msg) = RoomMessage::decode(&bytes) {
                                    if let Some(evt) = Self::event_for(&room_msg) {
                                        let _ = event_tx.send(evt).await;
                                    }
                                }
                            }
                            Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                                break;
                            }
                            _ => {}
                        }
                    }

                    // Connection lost
                    *state.write().await = ConnectionState::Disconnected;
                    let _ = event_tx.send(RoomEvent::Disconnected).await;
                });

                Ok(())
            }
            Err(_e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    /// Map a decoded server message to an application event.
    fn event_for(msg: &RoomMessage) -> Option<RoomEvent> {
        match msg.msg_type {
            MessageType::InitialState => msg.initial_state_payload().ok().map(|p| {
                RoomEvent::InitialState {
                    room: msg.room.clone(),
                    grid: p.grid,
                    history: p.history,
                }
            }),
            MessageType::NoteUpdate => msg.note_update_payload().ok().map(|p| {
                RoomEvent::NoteUpdate {
                    row: p.row,
                    col: p.col,
                    value: p.active,
                }
            }),
            MessageType::HistoryAppend => {
                msg.history_action().ok().map(RoomEvent::HistoryAppend)
            }
            MessageType::UserCount => msg.user_count_value().ok().map(|count| {
                RoomEvent::UserCount {
                    room: msg.room.clone(),
                    count,
                }
            }),
            MessageType::RoomList => msg.room_list_payload().ok().map(RoomEvent::RoomList),
            MessageType::RoomInfo => msg.room_info_payload().ok().map(|info| {
                RoomEvent::RoomInfo {
                    room: msg.room.clone(),
                    exists: info.exists,
                    user_count: info.user_count,
                }
            }),
            MessageType::Pong => Some(RoomEvent::Pong),
            _ => None,
        }
    }

    async fn send(&self, msg: &RoomMessage) -> Result<(), ProtocolError> {
        let encoded = msg.encode()?;
        if let Some(ref tx) = self.outgoing_tx {
            tx.send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
            Ok(())
        } else {
            Err(ProtocolError::ConnectionClosed)
        }
    }

    /// Join (or switch to) a room.
    ///
    /// The server answers with `InitialState` for the new room and
    /// updated user counts for both rooms.
    pub async fn join_room(&self, room: impl Into<String>) -> Result<(), ProtocolError> {
        let room = room.into();
        self.send(&RoomMessage::join_room(self.conn_id, &room)).await?;
        *self.current_room.write().await = Some(room);
        Ok(())
    }

    /// Toggle an instrument at (row, col) in the joined room.
    ///
    /// `None` lets the server use its default instrument. Dropped with
    /// a warning when no room has been joined.
    pub async fn toggle_note(
        &self,
        row: usize,
        col: usize,
        instrument: Option<String>,
    ) -> Result<(), ProtocolError> {
        let room = match self.current_room.read().await.clone() {
            Some(r) => r,
            None => {
                log::warn!("toggle_note before join_room; dropped");
                return Err(ProtocolError::NotInRoom);
            }
        };
        self.send(&RoomMessage::toggle_note(self.conn_id, room, row, col, instrument))
            .await
    }

    /// Upload an exported document (JSON) to replace the joined room's state.
    pub async fn import_state(&self, document_json: String) -> Result<(), ProtocolError> {
        let room = match self.current_room.read().await.clone() {
            Some(r) => r,
            None => return Err(ProtocolError::NotInRoom),
        };
        self.send(&RoomMessage::import_state(self.conn_id, room, document_json))
            .await
    }

    /// Ask for the current room list.
    pub async fn request_room_list(&self) -> Result<(), ProtocolError> {
        self.send(&RoomMessage::request_room_list(self.conn_id)).await
    }

    /// Ask whether a room exists and how many users it has.
    pub async fn check_room(&self, room: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(&RoomMessage::check_room(self.conn_id, room)).await
    }

    /// Send a ping to the server.
    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        self.send(&RoomMessage::ping(self.conn_id)).await
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Our connection identity.
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// The room this client has joined, if any.
    pub async fn current_room(&self) -> Option<String> {
        self.current_room.read().await.clone()
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
