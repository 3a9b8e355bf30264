mod call;
mod dispatch;
mod msg;
mod presence;
mod room;
mod ws;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
};

use axum::{routing::get, Router};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::{
    events::{RosterEntry, ServerEvent},
    registry::{Outbound, Registry},
    AppState, Config, ConnId, MessageStore,
};

pub use call::{CallOccupancy, CallStatus};
use presence::Room;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/messages", get(room::room_messages))
}

/// Owns every live room, the connection registry and the store handle.
///
/// Each room sits behind its own async mutex so rooms never contend with one
/// another. The id -> room map is only locked for lookups and never across an
/// await point. A room removed from the map is marked `closed` before its
/// lock is released, so a handler that raced the removal retries against the
/// fresh entry instead of mutating a dead room.
pub struct Hub {
    registry: Registry,
    rooms: StdMutex<HashMap<String, Arc<Mutex<Room>>>>,
    store: MessageStore,
    config: Arc<Config>,
}

impl Hub {
    pub fn new(store: MessageStore, config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::default(),
            rooms: StdMutex::new(HashMap::new()),
            store,
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers a connection whose events are written to `tx`. The first
    /// event it sees is its own id.
    pub fn register(&self, tx: Outbound) -> ConnId {
        let id = self.registry.register(tx);
        self.registry.send(id, ServerEvent::Connected { id });
        tracing::info!(conn = %id, "connected");
        id
    }

    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(tx), rx)
    }

    /// Disconnect cleanup: drops the connection, removes it from its room
    /// and force-ends any call it holds.
    pub async fn release(&self, id: ConnId) {
        let Some(conn) = self.registry.remove(id) else {
            return;
        };

        if let Some(room_id) = &conn.room {
            self.leave_room(id, room_id, crate::events::EndReason::Disconnect).await;
        }

        tracing::info!(conn = %id, room = ?conn.room, "disconnected");
    }

    /// Drops every room and connection, then closes the store. Writers see
    /// their channel close and hang up.
    pub async fn shutdown(&self) {
        let rooms: Vec<_> = self.rooms().drain().map(|(_, room)| room).collect();
        for room in rooms {
            room.lock().await.closed = true;
        }

        for id in self.registry.ids() {
            self.registry.remove(id);
        }

        self.store.close().await;
        tracing::info!("hub shut down");
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    pub async fn roster(&self, room_id: &str) -> Option<Vec<RosterEntry>> {
        self.lock_existing(room_id).await.map(|room| room.roster())
    }

    /// Members and call occupancy read under one lock, `None` when the room
    /// does not exist.
    pub async fn snapshot(&self, room_id: &str) -> Option<(Vec<RosterEntry>, Option<CallOccupancy>)> {
        self.lock_existing(room_id).await.map(|room| (room.roster(), room.call.clone()))
    }

    /// Current call occupancy, `None` when the room is idle or absent.
    pub async fn call_state(&self, room_id: &str) -> Option<CallOccupancy> {
        self.lock_existing(room_id).await.and_then(|room| room.call.clone())
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<Room>>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks `room_id`, creating it if needed.
    async fn lock_room(&self, room_id: &str) -> OwnedMutexGuard<Room> {
        loop {
            let handle = self
                .rooms()
                .entry(room_id.to_owned())
                .or_insert_with(|| {
                    tracing::debug!(room = room_id, "room created");
                    Arc::new(Mutex::new(Room::new(room_id)))
                })
                .clone();

            let room = handle.lock_owned().await;
            if !room.closed {
                return room;
            }
        }
    }

    async fn lock_existing(&self, room_id: &str) -> Option<OwnedMutexGuard<Room>> {
        let handle = self.rooms().get(room_id).cloned()?;
        let room = handle.lock_owned().await;
        (!room.closed).then_some(room)
    }

    /// Deletes an empty room while its lock is still held.
    fn discard_room(&self, room: &mut OwnedMutexGuard<Room>) {
        room.closed = true;
        room.call = None;

        let handle = OwnedMutexGuard::mutex(room);
        let mut rooms = self.rooms();
        if rooms.get(&room.id).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            rooms.remove(&room.id);
            tracing::debug!(room = %room.id, "room deleted");
        }
    }

    fn broadcast(&self, room: &Room, event: ServerEvent, except: Option<ConnId>) {
        for id in room.member_ids().filter(|id| Some(*id) != except) {
            self.registry.send(id, event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hub() -> Arc<Hub> {
        Hub::new(MessageStore::in_memory().await.unwrap(), Config::default())
    }

    #[tokio::test]
    async fn connect_announces_id() {
        let hub = hub().await;
        let (id, mut rx) = hub.connect();
        assert_eq!(rx.recv().await.unwrap(), ServerEvent::Connected { id });
        assert_eq!(hub.registry().len(), 1);
    }

    #[tokio::test]
    async fn release_unknown_is_noop() {
        let hub = hub().await;
        hub.release(uuid::Uuid::now_v7()).await;
        assert_eq!(hub.room_count(), 0);
    }

    #[tokio::test]
    async fn lock_existing_skips_closed_room() {
        let hub = hub().await;
        let mut room = hub.lock_room("r1").await;
        hub.discard_room(&mut room);
        drop(room);

        assert!(hub.lock_existing("r1").await.is_none());
        assert_eq!(hub.room_count(), 0);

        let room = hub.lock_room("r1").await;
        assert!(!room.closed);
        assert_eq!(hub.room_count(), 1);
    }

    #[tokio::test]
    async fn snapshot_reads_members_and_call_together() {
        let hub = hub().await;
        assert!(hub.snapshot("r1").await.is_none());

        let (a, _a_rx) = hub.connect();
        let (b, _b_rx) = hub.connect();
        hub.join(a, "r1", "alice").await.unwrap();
        hub.join(b, "r1", "bob").await.unwrap();
        hub.call_user(a, b, serde_json::json!("O")).await.unwrap();

        let (members, call) = hub.snapshot("r1").await.unwrap();
        let names: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, ["alice", "bob"]);
        let call = call.unwrap();
        assert_eq!((call.caller, call.target, call.status), (a, b, CallStatus::Ringing));
    }

    #[tokio::test]
    async fn shutdown_drops_connections() {
        let hub = hub().await;
        let (id, mut rx) = hub.connect();
        hub.join(id, "r1", "alice").await.unwrap();

        hub.shutdown().await;
        assert_eq!(hub.room_count(), 0);
        assert!(hub.registry().is_empty());

        while rx.recv().await.is_some() {}
    }
}
