//! Hub actor implementation
//!
//! The hub owns the room directory and the client registry. Every
//! structural change (client admission and retirement, room creation,
//! rehydration and purge, membership transfer) is a command processed by
//! this single loop, so check-then-act sequences never interleave.
//! Fan-out itself runs in each room's own dispatch loop.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::{RoomSummary, ServerMessage, UserRef};
use crate::room::{Room, RoomEvent};
use crate::store::{RoomStore, StoreError, StoredRoom};
use crate::types::{ClientId, RoomId};

/// Attempts at drawing a free generated room id
const ROOM_ID_ATTEMPTS: usize = 16;

/// Commands sent from connection handlers to the hub
#[derive(Debug)]
pub enum HubCommand {
    /// New client admitted
    Register { client: ClientHandle },
    /// Client disconnected
    Unregister { client_id: ClientId },
    /// Create a room, optionally with a chosen id
    CreateRoom {
        client_id: ClientId,
        room_id: Option<String>,
    },
    /// Join a room, leaving the current one if any
    JoinRoom {
        client_id: ClientId,
        room_id: String,
    },
    /// Leave the current room
    LeaveRoom { client_id: ClientId },
    /// Broadcast a chat message to the current room
    Chat { client_id: ClientId, content: Value },
    /// Relay a payload to one member of the current room
    Signal {
        client_id: ClientId,
        target: String,
        content: Value,
    },
    /// A room dropped this client for not keeping up
    Evicted { client_id: ClientId, room_id: RoomId },
    /// Snapshot of the in-memory rooms
    Rooms {
        reply: oneshot::Sender<Vec<RoomSummary>>,
    },
}

/// Cloneable sending side of the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Queue a command for the hub
    pub async fn send(&self, cmd: HubCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::HubClosed)
    }

    pub async fn register(&self, client: ClientHandle) -> Result<(), AppError> {
        self.send(HubCommand::Register { client }).await
    }

    pub async fn unregister(&self, client_id: ClientId) -> Result<(), AppError> {
        self.send(HubCommand::Unregister { client_id }).await
    }

    /// In-memory rooms and their members, sorted by room id
    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Rooms { reply }).await?;
        rx.await.map_err(|_| AppError::HubClosed)
    }
}

/// Registry entry for a connected client
#[derive(Debug)]
struct ClientEntry {
    handle: ClientHandle,
    /// Room currently joined (lookup key, the room never owns the client)
    room: Option<RoomId>,
}

/// Directory entry for a live room
///
/// Dropping the entry drops the only event sender, which stops the
/// room's dispatch loop.
#[derive(Debug)]
struct RoomEntry {
    room: Arc<Room>,
    events: mpsc::Sender<RoomEvent>,
}

/// The hub actor
///
/// Manages the room directory and client registry and processes
/// commands from connection handlers.
pub struct Hub {
    /// All registered clients: ClientId -> entry
    clients: HashMap<ClientId, ClientEntry>,
    /// Live rooms: RoomId -> entry
    rooms: BTreeMap<RoomId, RoomEntry>,
    /// Durable room directory
    store: Arc<dyn RoomStore>,
    history_limit: usize,
    room_channel_capacity: usize,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
    /// Handed to room loops for eviction reports; weak so rooms never
    /// keep the hub alive
    weak_sender: mpsc::WeakSender<HubCommand>,
}

impl Hub {
    /// Create a hub and the handle used to reach it
    pub fn new(config: &ServerConfig, store: Arc<dyn RoomStore>) -> (Self, HubHandle) {
        let (sender, receiver) = mpsc::channel(config.hub_channel_capacity);
        let hub = Self {
            clients: HashMap::new(),
            rooms: BTreeMap::new(),
            store,
            history_limit: config.history_limit,
            room_channel_capacity: config.room_channel_capacity,
            receiver,
            weak_sender: sender.downgrade(),
        };
        (hub, HubHandle { sender })
    }

    /// Create a hub and spawn its event loop
    pub fn spawn(config: &ServerConfig, store: Arc<dyn RoomStore>) -> HubHandle {
        let (hub, handle) = Self::new(config, store);
        tokio::spawn(hub.run());
        handle
    }

    /// Run the hub event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Hub shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { client } => {
                self.handle_register(client).await;
            }
            HubCommand::Unregister { client_id } => {
                self.handle_unregister(client_id).await;
            }
            HubCommand::CreateRoom { client_id, room_id } => {
                let result = self.handle_create_room(client_id, room_id);
                self.reply_on_error(client_id, result);
            }
            HubCommand::JoinRoom { client_id, room_id } => {
                let result = self.handle_join_room(client_id, &room_id).await;
                self.reply_on_error(client_id, result);
            }
            HubCommand::LeaveRoom { client_id } => {
                let result = self.handle_leave_room(client_id).await;
                self.reply_on_error(client_id, result);
            }
            HubCommand::Chat { client_id, content } => {
                let result = self.handle_chat(client_id, content).await;
                self.reply_on_error(client_id, result);
            }
            HubCommand::Signal {
                client_id,
                target,
                content,
            } => {
                let result = self.handle_signal(client_id, target, content).await;
                self.reply_on_error(client_id, result);
            }
            HubCommand::Evicted { client_id, room_id } => {
                self.handle_evicted(client_id, room_id).await;
            }
            HubCommand::Rooms { reply } => {
                let _ = reply.send(self.live_rooms().await);
            }
        }
    }

    /// Admit a client and send it the room listing
    async fn handle_register(&mut self, client: ClientHandle) {
        info!(client = %client.id(), username = client.username(), "Client registered");

        // Durable rooms first, then live occupancy on top
        let mut listing: BTreeMap<String, Vec<String>> = BTreeMap::new();
        match self.store.list_all_rooms() {
            Ok(stored) => {
                for room in stored {
                    listing.entry(room.room_id.to_string()).or_default();
                }
            }
            Err(e) => warn!("Room listing from store failed: {}", e),
        }
        for (room_id, entry) in &self.rooms {
            listing.insert(room_id.to_string(), entry.room.member_names().await);
        }

        let room_list = ServerMessage::RoomList {
            content: listing
                .into_iter()
                .map(|(room_id, users)| RoomSummary { room_id, users })
                .collect(),
        };
        send_or_drop(&client, &room_list);

        self.clients.insert(
            client.id(),
            ClientEntry {
                handle: client,
                room: None,
            },
        );
        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Retire a client: leave its room, close its queue, notify the room
    ///
    /// A second unregister for the same client finds no entry and does
    /// nothing, so the room hears about the departure once.
    async fn handle_unregister(&mut self, client_id: ClientId) {
        let Some(entry) = self.clients.remove(&client_id) else {
            debug!(client = %client_id, "Unregister for unknown client ignored");
            return;
        };

        info!(client = %client_id, username = entry.handle.username(), "Client unregistered");

        if let Some(room_id) = entry.room {
            self.depart(&entry.handle, &room_id).await;
        }
        entry.handle.close();

        debug!(
            "Total clients: {}, Total rooms: {}",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Clear the membership of a client its room has evicted
    ///
    /// The room already dropped the member and closed its queue. The
    /// remaining members hear `user_left` here, so a later unregister
    /// finds no room and stays silent.
    async fn handle_evicted(&mut self, client_id: ClientId, room_id: RoomId) {
        let Some(entry) = self.clients.get(&client_id) else {
            return;
        };
        if entry.room.as_ref() != Some(&room_id) {
            return;
        }
        let client = entry.handle.clone();

        if let Some(room) = self.rooms.get(&room_id) {
            if room.room.contains(client_id).await {
                return;
            }
        }

        warn!(room = %room_id, username = client.username(), "Member evicted");
        self.set_room(client_id, None);
        self.depart(&client, &room_id).await;
    }

    /// Handle room creation
    ///
    /// The creator is not placed in the room.
    fn handle_create_room(
        &mut self,
        client_id: ClientId,
        requested: Option<String>,
    ) -> Result<(), AppError> {
        let Some(client) = self.client(client_id) else {
            return Ok(());
        };

        let room_id = match requested {
            Some(raw) => RoomId::parse(&raw)?,
            None => self.unused_room_id()?,
        };

        if self.store.find_room_by_name(&room_id)?.is_some()
            || self.rooms.contains_key(&room_id)
        {
            return Err(AppError::RoomAlreadyExists(room_id.to_string()));
        }

        self.store
            .insert_room(StoredRoom::new(room_id.clone()))
            .map_err(|e| match e {
                StoreError::Duplicate(_) => AppError::RoomAlreadyExists(room_id.to_string()),
                other => other.into(),
            })?;
        self.open_room(room_id.clone());

        info!(client = %client_id, room = %room_id, "Room created");

        send_or_drop(
            &client,
            &ServerMessage::RoomCreated {
                room_id: room_id.to_string(),
            },
        );
        Ok(())
    }

    /// Handle room joining
    async fn handle_join_room(&mut self, client_id: ClientId, raw: &str) -> Result<(), AppError> {
        let Some(entry) = self.clients.get(&client_id) else {
            return Ok(());
        };
        let client = entry.handle.clone();
        let current = entry.room.clone();

        if client.is_closed() {
            debug!(client = %client_id, "Join from evicted client ignored");
            return Ok(());
        }

        let room_id = RoomId::parse(raw)?;
        if current.as_ref() == Some(&room_id) {
            return Err(AppError::AlreadyInRoom);
        }

        if !self.rooms.contains_key(&room_id) {
            // Purged from memory but still durable: bring it back
            if self.store.find_room_by_name(&room_id)?.is_none() {
                return Err(AppError::RoomNotFound(room_id.to_string()));
            }
            debug!(room = %room_id, "Rehydrating room from store");
            self.open_room(room_id.clone());
        }

        if let Some(previous) = current {
            self.depart(&client, &previous).await;
            self.set_room(client_id, None);
        }

        let Some(entry) = self.rooms.get(&room_id) else {
            return Err(AppError::RoomNotFound(room_id.to_string()));
        };
        entry.room.join(&client).await?;
        let events = entry.events.clone();
        self.set_room(client_id, Some(room_id.clone()));

        let joined = ServerMessage::UserJoined {
            room_id: room_id.to_string(),
            content: UserRef {
                username: client.username().to_string(),
            },
        };
        if let Some(frame) = joined.to_frame() {
            notify(
                &events,
                &room_id,
                RoomEvent::Notice {
                    frame,
                    exclude: Some(client_id),
                },
            )
            .await;
        }
        Ok(())
    }

    /// Handle voluntary room leaving
    async fn handle_leave_room(&mut self, client_id: ClientId) -> Result<(), AppError> {
        let Some(entry) = self.clients.get_mut(&client_id) else {
            return Ok(());
        };
        let Some(room_id) = entry.room.take() else {
            return Err(AppError::NotInRoom);
        };
        let client = entry.handle.clone();

        self.depart(&client, &room_id).await;
        Ok(())
    }

    /// Handle chat message
    async fn handle_chat(&mut self, client_id: ClientId, content: Value) -> Result<(), AppError> {
        let (client, room) = self.current_room(client_id).await?;

        let chat = ServerMessage::Chat {
            room_id: room.room.id().to_string(),
            from: client.username().to_string(),
            content,
        };
        let frame = chat.encode()?;
        notify(&room.events, room.room.id(), RoomEvent::Chat(frame)).await;
        Ok(())
    }

    /// Handle signaling relay
    async fn handle_signal(
        &mut self,
        client_id: ClientId,
        target: String,
        content: Value,
    ) -> Result<(), AppError> {
        let (client, room) = self.current_room(client_id).await?;

        debug!(
            room = %room.room.id(),
            from = client.username(),
            to = %target,
            "Relaying signal"
        );
        let signal = ServerMessage::Signal {
            room_id: room.room.id().to_string(),
            from: client.username().to_string(),
            target: target.clone(),
            content,
        };
        room.room.relay(&target, signal.encode()?).await
    }

    /// Helper: remove a client from a room, purging it when emptied
    async fn depart(&mut self, client: &ClientHandle, room_id: &RoomId) {
        let Some(entry) = self.rooms.get(room_id) else {
            return;
        };

        let departure = entry.room.leave(client.id()).await;
        info!(
            room = %room_id,
            username = client.username(),
            remaining = departure.remaining,
            evicted = !departure.was_member,
            "Member left"
        );

        if departure.remaining == 0 {
            self.rooms.remove(room_id);
            debug!(room = %room_id, "Room purged (empty)");
            return;
        }

        let left = ServerMessage::UserLeft {
            room_id: room_id.to_string(),
            content: UserRef {
                username: client.username().to_string(),
            },
        };
        if let Some(frame) = left.to_frame() {
            let events = entry.events.clone();
            notify(
                &events,
                room_id,
                RoomEvent::Notice {
                    frame,
                    exclude: None,
                },
            )
            .await;
        }
    }

    /// Helper: insert a fresh room and start its dispatch loop
    fn open_room(&mut self, room_id: RoomId) {
        let room = Arc::new(Room::new(room_id.clone(), self.history_limit));
        let events = room.start(self.room_channel_capacity, self.weak_sender.clone());
        self.rooms.insert(room_id, RoomEntry { room, events });
    }

    /// Helper: pick a generated id that is free in memory and in the store
    fn unused_room_id(&self) -> Result<RoomId, AppError> {
        for _ in 0..ROOM_ID_ATTEMPTS {
            let candidate = RoomId::generate();
            if !self.rooms.contains_key(&candidate)
                && self.store.find_room_by_name(&candidate)?.is_none()
            {
                return Ok(candidate);
            }
        }
        Err(AppError::RoomIdsExhausted(ROOM_ID_ATTEMPTS))
    }

    /// Helper: the client and the live room it is a member of
    ///
    /// A client evicted by its room fails here even before the hub has
    /// processed the eviction report.
    async fn current_room(
        &self,
        client_id: ClientId,
    ) -> Result<(ClientHandle, &RoomEntry), AppError> {
        let entry = self.clients.get(&client_id).ok_or(AppError::NotInRoom)?;
        let room = entry
            .room
            .as_ref()
            .and_then(|room_id| self.rooms.get(room_id))
            .ok_or(AppError::NotInRoom)?;
        if !room.room.contains(client_id).await {
            return Err(AppError::NotInRoom);
        }
        Ok((entry.handle.clone(), room))
    }

    fn client(&self, client_id: ClientId) -> Option<ClientHandle> {
        self.clients.get(&client_id).map(|e| e.handle.clone())
    }

    fn set_room(&mut self, client_id: ClientId, room: Option<RoomId>) {
        if let Some(entry) = self.clients.get_mut(&client_id) {
            entry.room = room;
        }
    }

    async fn live_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for (room_id, entry) in &self.rooms {
            rooms.push(RoomSummary {
                room_id: room_id.to_string(),
                users: entry.room.member_names().await,
            });
        }
        rooms
    }

    /// Report a per-message error to the requesting client only
    fn reply_on_error(&self, client_id: ClientId, result: Result<(), AppError>) {
        let Err(err) = result else {
            return;
        };
        debug!(client = %client_id, "Request failed: {}", err);
        if let Some(client) = self.client(client_id) {
            send_or_drop(&client, &ServerMessage::from(err));
        }
    }
}

/// Push a hub reply without ever waiting on the client
fn send_or_drop(client: &ClientHandle, msg: &ServerMessage) {
    let Some(frame) = msg.to_frame() else {
        return;
    };
    if let Err(e) = client.try_send(frame) {
        warn!(username = client.username(), "Dropped hub reply: {}", e);
    }
}

/// Hand an event to a room's dispatch loop
async fn notify(events: &mpsc::Sender<RoomEvent>, room_id: &RoomId, event: RoomEvent) {
    if events.send(event).await.is_err() {
        warn!(room = %room_id, "Room dispatch loop is gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ErrorCode;

    /// Store that claims every name is taken
    struct CrowdedStore;

    impl RoomStore for CrowdedStore {
        fn find_room_by_name(&self, room_id: &RoomId) -> Result<Option<StoredRoom>, StoreError> {
            Ok(Some(StoredRoom::new(room_id.clone())))
        }

        fn insert_room(&self, room: StoredRoom) -> Result<(), StoreError> {
            Err(StoreError::Duplicate(room.room_id.to_string()))
        }

        fn list_all_rooms(&self) -> Result<Vec<StoredRoom>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_unused_room_id_gives_up() {
        let (hub, _handle) = Hub::new(&ServerConfig::default(), Arc::new(CrowdedStore));

        let err = hub.unused_room_id().unwrap_err();
        assert!(matches!(err, AppError::RoomIdsExhausted(n) if n == ROOM_ID_ATTEMPTS));

        match ServerMessage::from(err) {
            ServerMessage::Error { content } => assert_eq!(content.code, ErrorCode::Internal),
            other => panic!("Wrong message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_without_id_reports_exhaustion() {
        let (mut hub, _handle) = Hub::new(&ServerConfig::default(), Arc::new(CrowdedStore));
        let (client, mut rx) = ClientHandle::new(ClientId::new(), "alice", 8);
        hub.handle_register(client.clone()).await;
        rx.recv().await.unwrap();

        hub.handle_command(HubCommand::CreateRoom {
            client_id: client.id(),
            room_id: None,
        })
        .await;

        let msg: ServerMessage = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Error { content } if content.code == ErrorCode::Internal
        ));
        assert!(hub.rooms.is_empty());
    }
}
