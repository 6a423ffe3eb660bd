//! WebSocket grid server with room-based routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── Room ("Room 1") ── Grid + ActionLog ── BroadcastGroup
//! Client B ──┘                             │
//!                                          │  NoteUpdate + HistoryAppend
//!                               ┌──────────┼───────────┐
//!                               ▼          ▼           ▼
//!                            Client A   Client B    Client C
//!
//!             Lobby channel (all connections): RoomList updates
//! ```
//!
//! Each room holds an authoritative grid, its append-only action log
//! and a `BroadcastGroup` for fan-out. Every accepted toggle is applied
//! to the room's grid, appended to its log, and broadcast to the whole
//! room as a `NoteUpdate` followed by a `HistoryAppend` carrying the
//! same action — the sender included, so every client's log stays a
//! replica of the server's. Room-list changes (joins, leaves,
//! disconnects, new rooms) go out on the lobby channel to every
//! connection regardless of room.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use gridjam_core::{ExportDocument, GridConfig, DEFAULT_INSTRUMENT};

use crate::broadcast::RoomChannels;
use crate::protocol::{MessageType, RoomMessage};
use crate::room::RoomStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Grid dimensions for every room
    pub grid: GridConfig,
    /// Rooms created at startup so the first client never sees an
    /// empty room list
    pub default_rooms: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9091".to_string(),
            broadcast_capacity: 256,
            grid: GridConfig::default(),
            default_rooms: vec!["Room 1".to_string(), "Room 2".to_string()],
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

/// The grid server.
pub struct GridServer {
    config: ServerConfig,
    /// Authoritative room state: grids, logs, membership
    store: Arc<RwLock<RoomStore>>,
    /// Per-room broadcast channels + lobby
    channels: Arc<RoomChannels>,
    /// Server-wide statistics
    stats: Arc<RwLock<ServerStats>>,
}

impl GridServer {
    /// Create a new grid server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let channels = Arc::new(RoomChannels::new(config.broadcast_capacity));
        let store = Arc::new(RwLock::new(RoomStore::new(config.grid)));
        Self {
            config,
            store,
            channels,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        {
            let mut store = self.store.write().await;
            for name in &self.config.default_rooms {
                store.get_or_create(name);
            }
            let mut s = self.stats.write().await;
            s.active_rooms = store.room_count();
        }

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!(
            "Grid server listening on {} ({}x{} grid, {} default rooms)",
            self.config.bind_addr,
            self.config.grid.rows,
            self.config.grid.cols,
            self.config.default_rooms.len()
        );

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let store = self.store.clone();
            let channels = self.channels.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, store, channels, stats).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        store: Arc<RwLock<RoomStore>>,
        channels: Arc<RoomChannels>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // Server-assigned identity for the lifetime of this socket
        let conn_id = Uuid::new_v4();
        log::info!("WebSocket connection established from {addr} as {conn_id}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Every connection hears room-list updates from the start
        let lobby = channels.lobby();
        let mut lobby_rx = lobby.subscribe();

        // State for this connection
        let mut current_room: Option<String> = None;
        let mut room_rx: Option<tokio::sync::broadcast::Receiver<Arc<Vec<u8>>>> = None;

        let mut socket_open = true;

        // Initial room list so the client can render a picker immediately
        {
            let rooms = store.read().await.list_rooms();
            match RoomMessage::room_list(&rooms).encode() {
                Ok(encoded) => {
                    socket_open = ws_sender.send(Message::Binary(encoded.into())).await.is_ok();
                }
                Err(e) => log::warn!("Failed to encode room list for {conn_id}: {e}"),
            }
        }

        // Every exit from this loop falls through to the leave cleanup
        // below. A failed socket write breaks instead of returning, so a
        // peer whose connection died mid-send is still removed from its
        // room and the membership broadcasts still go out.
        while socket_open {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            match RoomMessage::decode(&bytes) {
                                Ok(room_msg) => {
                                    {
                                        let mut s = stats.write().await;
                                        s.total_messages += 1;
                                        s.total_bytes += bytes.len() as u64;
                                    }

                                    match room_msg.msg_type {
                                        MessageType::JoinRoom => {
                                            let target = room_msg.room.clone();

                                            // Leave the previous room first
                                            if let Some(old) = current_room.take() {
                                                let remaining = {
                                                    let mut st = store.write().await;
                                                    st.remove_user(&old, &conn_id)
                                                };
                                                if let Some(count) = remaining {
                                                    let group = channels.get_or_create(&old).await;
                                                    let _ = group.publish(
                                                        &RoomMessage::user_count(&old, count),
                                                    );
                                                }
                                                room_rx = None;
                                            }

                                            // Subscribe before publishing so the joiner
                                            // cannot miss its own join's broadcasts
                                            let group = channels.get_or_create(&target).await;
                                            room_rx = Some(group.subscribe());

                                            let (count, state_msg, rooms) = {
                                                let mut st = store.write().await;
                                                let count = st.add_user(&target, conn_id);
                                                let room = match st.room(&target) {
                                                    Some(r) => r,
                                                    None => continue,
                                                };
                                                let state_msg = RoomMessage::initial_state(
                                                    &target,
                                                    room.grid(),
                                                    room.log(),
                                                );
                                                (count, state_msg, st.list_rooms())
                                            };

                                            // The store knows this member now; bind the
                                            // room before any fallible send so the leave
                                            // cleanup covers it whichever way we exit
                                            current_room = Some(target.clone());

                                            // Full state goes to the joiner only
                                            match state_msg.encode() {
                                                Ok(encoded) => {
                                                    if ws_sender
                                                        .send(Message::Binary(encoded.into()))
                                                        .await
                                                        .is_err()
                                                    {
                                                        break;
                                                    }
                                                }
                                                Err(e) => {
                                                    log::warn!(
                                                        "Failed to encode initial state for {conn_id}: {e}"
                                                    );
                                                    break;
                                                }
                                            }

                                            let _ = group.publish(
                                                &RoomMessage::user_count(&target, count),
                                            );
                                            let _ = lobby.publish(&RoomMessage::room_list(&rooms));

                                            {
                                                let mut s = stats.write().await;
                                                s.active_rooms = rooms.len();
                                            }

                                            log::info!("{conn_id} joined {target} ({count} users)");
                                        }

                                        MessageType::ToggleNote => {
                                            // Toggles from a connection with no room are
                                            // dropped, not errored
                                            let room = match &current_room {
                                                Some(r) => r.clone(),
                                                None => {
                                                    log::warn!(
                                                        "{conn_id} sent ToggleNote without joining a room"
                                                    );
                                                    continue;
                                                }
                                            };

                                            let payload = match room_msg.toggle_payload() {
                                                Ok(p) => p,
                                                Err(e) => {
                                                    log::warn!("Bad toggle payload from {conn_id}: {e}");
                                                    continue;
                                                }
                                            };
                                            let instrument = payload
                                                .instrument
                                                .as_deref()
                                                .unwrap_or(DEFAULT_INSTRUMENT);

                                            let result = {
                                                let mut st = store.write().await;
                                                st.apply_toggle(&room, payload.row, payload.col, instrument)
                                            };

                                            match result {
                                                Ok((value, action)) => {
                                                    // Live update first, then the log delta,
                                                    // on the same channel so order is fixed
                                                    let group = channels.get_or_create(&room).await;
                                                    let _ = group.publish(&RoomMessage::note_update(
                                                        &room,
                                                        payload.row,
                                                        payload.col,
                                                        value,
                                                    ));
                                                    let _ = group.publish(
                                                        &RoomMessage::history_append(&room, &action),
                                                    );
                                                }
                                                Err(e) => {
                                                    log::warn!("Toggle rejected for {conn_id}: {e}");
                                                }
                                            }
                                        }

                                        MessageType::ImportState => {
                                            let room = match &current_room {
                                                Some(r) => r.clone(),
                                                None => {
                                                    log::warn!(
                                                        "{conn_id} sent ImportState without joining a room"
                                                    );
                                                    continue;
                                                }
                                            };

                                            let imported = room_msg
                                                .import_json()
                                                .map_err(|e| e.to_string())
                                                .and_then(|json| {
                                                    ExportDocument::from_json(json)
                                                        .map_err(|e| e.to_string())
                                                });

                                            let document = match imported {
                                                Ok(doc) => doc,
                                                Err(e) => {
                                                    log::warn!("Bad import document from {conn_id}: {e}");
                                                    continue;
                                                }
                                            };

                                            let state_msg = {
                                                let mut st = store.write().await;
                                                match st.import_state(&room, document) {
                                                    Ok(()) => st.room(&room).map(|r| {
                                                        RoomMessage::initial_state(
                                                            &room,
                                                            r.grid(),
                                                            r.log(),
                                                        )
                                                    }),
                                                    Err(e) => {
                                                        log::warn!(
                                                            "Import rejected for {conn_id} in {room}: {e}"
                                                        );
                                                        None
                                                    }
                                                }
                                            };

                                            // Imports replace everyone's state, so the
                                            // whole room gets a fresh InitialState
                                            if let Some(msg) = state_msg {
                                                let group = channels.get_or_create(&room).await;
                                                let _ = group.publish(&msg);
                                            }
                                        }

                                        MessageType::RequestRoomList => {
                                            let rooms = store.read().await.list_rooms();
                                            match RoomMessage::room_list(&rooms).encode() {
                                                Ok(encoded) => {
                                                    if ws_sender
                                                        .send(Message::Binary(encoded.into()))
                                                        .await
                                                        .is_err()
                                                    {
                                                        break;
                                                    }
                                                }
                                                Err(e) => log::warn!(
                                                    "Failed to encode room list for {conn_id}: {e}"
                                                ),
                                            }
                                        }

                                        MessageType::CheckRoom => {
                                            let (exists, count) = {
                                                let st = store.read().await;
                                                (
                                                    st.room_exists(&room_msg.room),
                                                    st.user_count(&room_msg.room),
                                                )
                                            };
                                            let reply =
                                                RoomMessage::room_info(&room_msg.room, exists, count);
                                            match reply.encode() {
                                                Ok(encoded) => {
                                                    if ws_sender
                                                        .send(Message::Binary(encoded.into()))
                                                        .await
                                                        .is_err()
                                                    {
                                                        break;
                                                    }
                                                }
                                                Err(e) => log::warn!(
                                                    "Failed to encode room info for {conn_id}: {e}"
                                                ),
                                            }
                                        }

                                        MessageType::Ping => {
                                            match RoomMessage::pong(conn_id).encode() {
                                                Ok(encoded) => {
                                                    if ws_sender
                                                        .send(Message::Binary(encoded.into()))
                                                        .await
                                                        .is_err()
                                                    {
                                                        break;
                                                    }
                                                }
                                                Err(e) => log::warn!(
                                                    "Failed to encode pong for {conn_id}: {e}"
                                                ),
                                            }
                                        }

                                        _ => {
                                            log::debug!(
                                                "Unhandled message type from {conn_id}: {:?}",
                                                room_msg.msg_type
                                            );
                                        }
                                    }
                                }
                                Err(e) => {
                                    log::warn!("Failed to decode message from {addr}: {e}");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(Message::Ping(data))) => {
                            if ws_sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                // Fan-out from the joined room (includes this connection's
                // own edits — clients rely on the echo for their local log)
                msg = async {
                    if let Some(ref mut rx) = room_rx {
                        rx.recv().await
                    } else {
                        // Not in a room — wait forever
                        std::future::pending().await
                    }
                } => {
                    match msg {
                        Ok(data) => {
                            if ws_sender.send(Message::Binary(data.to_vec().into())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Connection {conn_id} lagged by {n} room messages");
                        }
                        Err(_) => break,
                    }
                }

                // Lobby fan-out (room list updates)
                msg = lobby_rx.recv() => {
                    match msg {
                        Ok(data) => {
                            if ws_sender.send(Message::Binary(data.to_vec().into())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("Connection {conn_id} lagged by {n} lobby messages");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        // Cleanup: leave the room and tell everyone
        if let Some(room) = current_room {
            let (remaining, rooms) = {
                let mut st = store.write().await;
                let remaining = st.remove_user(&room, &conn_id);
                (remaining, st.list_rooms())
            };
            if let Some(count) = remaining {
                let group = channels.get_or_create(&room).await;
                let _ = group.publish(&RoomMessage::user_count(&room, count));
            }
            let _ = lobby.publish(&RoomMessage::room_list(&rooms));
        }

        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Shared room state, mainly for tests and tooling.
    pub fn store(&self) -> &Arc<RwLock<RoomStore>> {
        &self.store
    }

    /// Per-room broadcast channels.
    pub fn channels(&self) -> &Arc<RoomChannels> {
        &self.channels
    }
}
