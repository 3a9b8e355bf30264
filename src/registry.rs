//! Live connections: id, claimed display name, current room and the
//! outbound channel feeding the connection's socket writer.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{events::ServerEvent, ConnId};

pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub display_name: Option<String>,
    pub room: Option<String>,
    tx: Outbound,
}

#[derive(Debug, Default)]
pub struct Registry {
    conns: Mutex<HashMap<ConnId, Connection>>,
}

impl Registry {
    fn conns(&self) -> MutexGuard<'_, HashMap<ConnId, Connection>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, tx: Outbound) -> ConnId {
        let id = Uuid::now_v7();
        self.conns().insert(id, Connection { id, display_name: None, room: None, tx });
        id
    }

    pub fn associate(&self, id: ConnId, room: &str, display_name: &str) {
        if let Some(conn) = self.conns().get_mut(&id) {
            conn.room = Some(room.to_owned());
            conn.display_name = Some(display_name.to_owned());
        }
    }

    /// Clears the room association, but only if it still points at `room`.
    pub fn dissociate(&self, id: ConnId, room: &str) {
        if let Some(conn) = self.conns().get_mut(&id) {
            if conn.room.as_deref() == Some(room) {
                conn.room = None;
            }
        }
    }

    pub fn remove(&self, id: ConnId) -> Option<Connection> {
        self.conns().remove(&id)
    }

    pub fn contains(&self, id: ConnId) -> bool {
        self.conns().contains_key(&id)
    }

    pub fn current_room(&self, id: ConnId) -> Option<String> {
        self.conns().get(&id).and_then(|conn| conn.room.clone())
    }

    pub fn display_name(&self, id: ConnId) -> Option<String> {
        self.conns().get(&id).and_then(|conn| conn.display_name.clone())
    }

    /// Queues `event` for `id`. Returns false when the connection is gone.
    pub fn send(&self, id: ConnId, event: ServerEvent) -> bool {
        match self.conns().get(&id) {
            Some(conn) => conn.tx.send(event).is_ok(),
            None => {
                tracing::trace!(%id, "dropping event for unknown connection");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.conns().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns().is_empty()
    }

    pub fn ids(&self) -> Vec<ConnId> {
        self.conns().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_unique_ids() {
        let registry = Registry::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = registry.register(tx.clone());
        let b = registry.register(tx);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn associate_and_dissociate() {
        let registry = Registry::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.register(tx);

        registry.associate(id, "r1", "alice");
        assert_eq!(registry.current_room(id).as_deref(), Some("r1"));
        assert_eq!(registry.display_name(id).as_deref(), Some("alice"));

        registry.dissociate(id, "r2");
        assert_eq!(registry.current_room(id).as_deref(), Some("r1"));
        registry.dissociate(id, "r1");
        assert_eq!(registry.current_room(id), None);
    }

    #[test]
    fn send_reaches_live_connection_only() {
        let registry = Registry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.register(tx);

        assert!(registry.send(id, ServerEvent::Connected { id }));
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Connected { id });

        registry.remove(id);
        assert!(!registry.send(id, ServerEvent::Connected { id }));
        assert!(registry.is_empty());
    }
}
