//! Room definition
//!
//! A room owns its member set and a bounded chat history behind one lock,
//! and runs a dispatch loop that fans room events out to the members.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::error::{AppError, SendError};
use crate::hub::HubCommand;
use crate::message::ServerMessage;
use crate::types::{ClientId, Frame, RoomId};

/// Event handed to a room's dispatch loop
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Chat frame: recorded in history and delivered to every member
    Chat(Frame),
    /// Notification: delivered to every member except `exclude`
    Notice {
        frame: Frame,
        exclude: Option<ClientId>,
    },
}

/// Result of removing a client from a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    /// The client was still a member (it may have been evicted earlier)
    pub was_member: bool,
    /// Members left behind
    pub remaining: usize,
}

#[derive(Debug)]
struct RoomState {
    /// Members in join order
    members: Vec<ClientHandle>,
    /// Most recent chat frames, oldest first
    history: VecDeque<Frame>,
}

/// Multi-member chat room
///
/// All membership changes and every fan-out happen under `state`, so a
/// broadcast always sees a consistent member set and a joiner receives
/// each chat frame exactly once (replayed from history or live).
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    history_limit: usize,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: RoomId, history_limit: usize) -> Self {
        Self {
            id,
            history_limit,
            state: Mutex::new(RoomState {
                members: Vec::new(),
                history: VecDeque::new(),
            }),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Spawn the dispatch loop and return the sender feeding it
    ///
    /// Evicted members are reported to `hub` as `HubCommand::Evicted`.
    /// The loop ends once every sender has been dropped.
    pub fn start(
        self: &Arc<Self>,
        capacity: usize,
        hub: mpsc::WeakSender<HubCommand>,
    ) -> mpsc::Sender<RoomEvent> {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(Arc::clone(self).run(rx, hub));
        tx
    }

    async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<RoomEvent>,
        hub: mpsc::WeakSender<HubCommand>,
    ) {
        debug!(room = %self.id, "Room dispatch loop started");

        while let Some(event) = rx.recv().await {
            let evicted = self.dispatch(event).await;
            if evicted.is_empty() {
                continue;
            }
            let Some(hub) = hub.upgrade() else {
                continue;
            };
            for client in evicted {
                let cmd = HubCommand::Evicted {
                    client_id: client.id(),
                    room_id: self.id.clone(),
                };
                // The hub may be blocked feeding this loop, so report from
                // a separate task
                let hub = hub.clone();
                tokio::spawn(async move {
                    let _ = hub.send(cmd).await;
                });
            }
        }

        debug!(room = %self.id, "Room dispatch loop stopped");
    }

    /// Fan one event out to the current members
    ///
    /// A member whose queue is full or closed is evicted: its queue is
    /// closed, its writer is told to abandon the connection and it is
    /// dropped from the member set. Returns the evicted clients.
    pub async fn dispatch(&self, event: RoomEvent) -> Vec<ClientHandle> {
        let mut state = self.state.lock().await;

        let (frame, exclude) = match event {
            RoomEvent::Chat(frame) => {
                if self.history_limit > 0 {
                    if state.history.len() == self.history_limit {
                        state.history.pop_front();
                    }
                    state.history.push_back(frame.clone());
                }
                (frame, None)
            }
            RoomEvent::Notice { frame, exclude } => (frame, exclude),
        };

        let mut evicted = Vec::new();
        state.members.retain(|member| {
            if Some(member.id()) == exclude {
                return true;
            }
            match member.try_send(frame.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        room = %self.id,
                        username = member.username(),
                        "Evicting member: {}",
                        e
                    );
                    member.evict();
                    evicted.push(member.clone());
                    false
                }
            }
        });

        evicted
    }

    /// Add a client to the room
    ///
    /// The joiner first receives the chat history, oldest first, then a
    /// `user_list` of the other occupants. Announcing the join to the
    /// others is left to the caller.
    pub async fn join(&self, client: &ClientHandle) -> Result<(), AppError> {
        let mut state = self.state.lock().await;

        if state.members.iter().any(|m| m.id() == client.id()) {
            return Err(AppError::AlreadyInRoom);
        }

        for frame in &state.history {
            if let Err(e) = client.try_send(frame.clone()) {
                warn!(
                    room = %self.id,
                    username = client.username(),
                    "History replay cut short: {}",
                    e
                );
                break;
            }
        }

        let others: Vec<String> = state
            .members
            .iter()
            .map(|m| m.username().to_string())
            .collect();
        let user_list = ServerMessage::UserList {
            room_id: self.id.to_string(),
            content: others,
        };
        if let Some(frame) = user_list.to_frame() {
            if let Err(e) = client.try_send(frame) {
                warn!(room = %self.id, username = client.username(), "Dropped user_list: {}", e);
            }
        }

        state.members.push(client.clone());
        info!(
            room = %self.id,
            username = client.username(),
            members = state.members.len(),
            "Member joined"
        );
        Ok(())
    }

    /// Remove a client from the room
    pub async fn leave(&self, client_id: ClientId) -> Departure {
        let mut state = self.state.lock().await;
        let before = state.members.len();
        state.members.retain(|m| m.id() != client_id);

        Departure {
            was_member: state.members.len() != before,
            remaining: state.members.len(),
        }
    }

    /// Deliver a frame to the member named `target`
    ///
    /// Best effort: a saturated target queue drops the frame without
    /// evicting anyone.
    pub async fn relay(&self, target: &str, frame: Frame) -> Result<(), AppError> {
        let state = self.state.lock().await;

        let Some(member) = state.members.iter().find(|m| m.username() == target) else {
            return Err(AppError::TargetNotFound(target.to_string()));
        };

        match member.try_send(frame) {
            Ok(()) => {}
            Err(SendError::QueueSaturated) => {
                debug!(room = %self.id, username = target, "Signal dropped, target queue full");
            }
            Err(SendError::ChannelClosed) => {
                debug!(room = %self.id, username = target, "Signal dropped, target closing");
            }
        }
        Ok(())
    }

    /// Usernames of the current members, in join order
    pub async fn member_names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .members
            .iter()
            .map(|m| m.username().to_string())
            .collect()
    }

    #[cfg(test)]
    async fn member_count(&self) -> usize {
        self.state.lock().await.members.len()
    }

    pub async fn contains(&self, client_id: ClientId) -> bool {
        let state = self.state.lock().await;
        state.members.iter().any(|m| m.id() == client_id)
    }
}
