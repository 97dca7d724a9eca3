#![forbid(unsafe_code)]

// Room module - room registry, membership and message fan-out

use crate::auth::password;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

/// Typed errors for registry and broadcast operations.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("room with short code [{0}] not found")]
    RoomNotFound(String),

    #[error("room with short code [{0}] already exists")]
    RoomAlreadyExists(String),

    #[error("invalid room password")]
    InvalidPassword,

    #[error("only the room owner may delete the room")]
    NotOwner,

    #[error("participant [{0}] is already in the room")]
    MemberAlreadyExists(String),

    #[error("participant [{0}] not found in the room")]
    MemberNotFound(String),

    #[error("participant message queue is closed")]
    QueueClosed,

    #[error("password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
}

/// A chat message as it travels through participant queues.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Participant name of the author.
    pub sender: String,
    /// Opaque message text. The registry imposes no size limit.
    pub body: String,
}

/// A room member and their bounded inbound queue.
///
/// The `Sender` half lives here and is cloned transiently during fan-out.
/// The `Receiver` half sits behind an `Arc<Mutex>` so that a reader already
/// blocked in `next_message` keeps its handle when the participant is
/// removed from the map, and observes closure instead of hanging.
struct Participant {
    name: String,
    queue_tx: mpsc::Sender<Message>,
    queue_rx: Arc<TokioMutex<mpsc::Receiver<Message>>>,
}

struct Room {
    name: String,
    password_hash: String,
    owner: String,
    members: HashMap<String, Participant>,
}

/// Single source of truth for room existence and membership.
///
/// One `std::sync::RwLock` guards the whole room map, rooms and member maps
/// included. The guard is never held across an await point: broadcast and
/// receive snapshot the handles they need and release the lock before any
/// queue operation, so a slow consumer cannot stall unrelated registry calls.
pub struct RoomRegistry {
    rooms: StdRwLock<HashMap<String, Room>>,
    queue_capacity: usize,
}

impl RoomRegistry {
    /// Creates a registry whose participant queues hold at most
    /// `queue_capacity` pending messages. Capacity is clamped to at least 1.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            rooms: StdRwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Checks whether a room with the given short code exists. Never fails.
    pub fn room_exists(&self, short_code: &str) -> bool {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.contains_key(short_code)
    }

    /// Compares a candidate password against the room's stored hash.
    ///
    /// The hash is cloned out so the argon2 verification runs outside the
    /// registry lock.
    pub fn check_password(&self, short_code: &str, candidate: &str) -> Result<(), RegistryError> {
        let hash = {
            let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
            let room = rooms
                .get(short_code)
                .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;
            room.password_hash.clone()
        };

        match password::verify(candidate, &hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RegistryError::InvalidPassword),
            Err(e) => Err(RegistryError::Hash(e)),
        }
    }

    /// Registers a new room under `short_code`, recording `owner` as the
    /// only account allowed to delete it.
    ///
    /// The short code generator makes collisions astronomically unlikely,
    /// but a duplicate code is still rejected deterministically.
    pub fn create_room(
        &self,
        short_code: &str,
        name: &str,
        room_password: &str,
        owner: &str,
    ) -> Result<(), RegistryError> {
        // Hash before taking the write lock; argon2 is deliberately slow.
        let password_hash = password::hash(room_password).map_err(RegistryError::Hash)?;

        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        if rooms.contains_key(short_code) {
            return Err(RegistryError::RoomAlreadyExists(short_code.to_string()));
        }

        rooms.insert(
            short_code.to_string(),
            Room {
                name: name.to_string(),
                password_hash,
                owner: owner.to_string(),
                members: HashMap::new(),
            },
        );

        info!("Created room [{}] with short code [{}]", name, short_code);
        Ok(())
    }

    /// Deletes a room. Owner-only: any other caller gets `NotOwner`.
    ///
    /// Dropping the room drops every member's queue sender, so readers
    /// blocked in `next_message` wake with `QueueClosed` and their egress
    /// loops unwind even though their streams are otherwise healthy.
    pub fn delete_room(&self, short_code: &str, caller: &str) -> Result<(), RegistryError> {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let room = rooms
            .get(short_code)
            .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;

        if room.owner != caller {
            return Err(RegistryError::NotOwner);
        }

        let room = rooms.remove(short_code).expect("room presence checked above");
        info!(
            "Deleted room [{}] with short code [{}] ({} members evicted)",
            room.name,
            short_code,
            room.members.len()
        );
        Ok(())
    }

    /// Adds a participant to a room, creating their bounded inbound queue.
    pub fn add_member(&self, short_code: &str, name: &str) -> Result<(), RegistryError> {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let room = rooms
            .get_mut(short_code)
            .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;

        if room.members.contains_key(name) {
            return Err(RegistryError::MemberAlreadyExists(name.to_string()));
        }

        let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
        room.members.insert(
            name.to_string(),
            Participant {
                name: name.to_string(),
                queue_tx,
                queue_rx: Arc::new(TokioMutex::new(queue_rx)),
            },
        );

        info!("Participant [{}] joined room [{}]", name, short_code);
        Ok(())
    }

    /// Removes a participant, closing their queue. A reader blocked in
    /// `next_message` observes `QueueClosed` once the last transient sender
    /// clone is gone.
    pub fn remove_member(&self, short_code: &str, name: &str) -> Result<(), RegistryError> {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let room = rooms
            .get_mut(short_code)
            .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;

        if room.members.remove(name).is_none() {
            return Err(RegistryError::MemberNotFound(name.to_string()));
        }

        info!("Participant [{}] left room [{}]", name, short_code);
        Ok(())
    }

    /// Lists the names of all current members of a room.
    pub fn list_members(&self, short_code: &str) -> Result<Vec<String>, RegistryError> {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        let room = rooms
            .get(short_code)
            .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;

        Ok(room.members.keys().cloned().collect())
    }

    /// Checks current membership of `name` in the room.
    pub fn is_member(&self, short_code: &str, name: &str) -> Result<bool, RegistryError> {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        let room = rooms
            .get(short_code)
            .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;

        Ok(room.members.contains_key(name))
    }

    /// Delivers `message` to the queue of every member except its sender.
    ///
    /// A full queue blocks the broadcaster until the consumer drains it,
    /// leaves, or the room is deleted — backpressure, not silent drop. The
    /// member snapshot is taken under the read lock and the lock released
    /// before any send, so a stalled consumer never blocks the registry.
    /// A queue that closed mid-fan-out (member left concurrently) is skipped.
    pub async fn broadcast(&self, short_code: &str, message: &Message) -> Result<(), RegistryError> {
        let targets: Vec<(String, mpsc::Sender<Message>)> = {
            let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
            let room = rooms
                .get(short_code)
                .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;

            room.members
                .values()
                .filter(|p| p.name != message.sender)
                .map(|p| (p.name.clone(), p.queue_tx.clone()))
                .collect()
        };

        for (name, tx) in targets {
            if tx.send(message.clone()).await.is_err() {
                debug!(
                    "Participant [{}] left room [{}] during fan-out, skipping delivery",
                    name, short_code
                );
            }
        }

        Ok(())
    }

    /// Blocking dequeue of the next message addressed to `name`.
    ///
    /// Returns `MemberNotFound` if the participant is already gone when the
    /// call starts; `QueueClosed` is reserved for a queue that existed and
    /// was closed while the caller was blocked on it.
    pub async fn next_message(&self, short_code: &str, name: &str) -> Result<Message, RegistryError> {
        let queue_rx = {
            let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
            let room = rooms
                .get(short_code)
                .ok_or_else(|| RegistryError::RoomNotFound(short_code.to_string()))?;
            let member = room
                .members
                .get(name)
                .ok_or_else(|| RegistryError::MemberNotFound(name.to_string()))?;
            Arc::clone(&member.queue_rx)
        };

        let mut rx = queue_rx.lock().await;
        rx.recv().await.ok_or(RegistryError::QueueClosed)
    }

    /// Current room count, for health reporting.
    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Total participant count across all rooms, for health reporting.
    pub fn total_member_count(&self) -> usize {
        let rooms = self.rooms.read().unwrap_or_else(|e| e.into_inner());
        rooms.values().map(|r| r.members.len()).sum()
    }
}
