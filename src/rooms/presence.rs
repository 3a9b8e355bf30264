use std::sync::Arc;

use crate::{
    db::now_ms,
    events::{EndReason, RosterEntry, ServerEvent},
    ConnId, RelayError, RelayResult,
};

use super::{CallOccupancy, Hub};

#[derive(Debug)]
struct Member {
    id: ConnId,
    username: String,
}

/// Presence state for one room. Members keep their join order.
#[derive(Debug)]
pub(crate) struct Room {
    pub(crate) id: String,
    members: Vec<Member>,
    pub(crate) call: Option<CallOccupancy>,
    pub(crate) closed: bool,
}

impl Room {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            members: Vec::new(),
            call: None,
            closed: false,
        }
    }

    /// Inserts or renames `id`. A rejoin keeps the original position.
    fn upsert(&mut self, id: ConnId, username: &str) -> bool {
        match self.members.iter_mut().find(|m| m.id == id) {
            Some(member) => {
                member.username = username.to_owned();
                false
            }
            None => {
                self.members.push(Member { id, username: username.to_owned() });
                true
            }
        }
    }

    fn remove(&mut self, id: ConnId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.id != id);
        self.members.len() != before
    }

    pub(crate) fn contains(&self, id: ConnId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn member_ids(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.members.iter().map(|m| m.id)
    }

    pub(crate) fn roster(&self) -> Vec<RosterEntry> {
        self.members
            .iter()
            .map(|m| RosterEntry { id: m.id, username: m.username.clone() })
            .collect()
    }
}

fn require(field: &str, value: &str) -> RelayResult<()> {
    if value.trim().is_empty() {
        return Err(RelayError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl Hub {
    /// Puts `conn` in `room_id` under `username`, leaving any other room
    /// first. Every member gets the new roster; the joiner additionally gets
    /// a history backfill, delivered on its own schedule.
    pub async fn join(self: &Arc<Self>, conn: ConnId, room_id: &str, username: &str) -> RelayResult<()> {
        require("roomId", room_id)?;
        require("username", username)?;

        if !self.registry.contains(conn) {
            return Ok(());
        }

        let requested_at = now_ms();

        if let Some(previous) = self.registry.current_room(conn).filter(|prev| prev != room_id) {
            self.leave_room(conn, &previous, EndReason::Left).await;
        }

        let mut room = self.lock_room(room_id).await;
        let inserted = room.upsert(conn, username);
        self.registry.associate(conn, room_id, username);
        self.broadcast(&room, ServerEvent::UpdateUserList(room.roster()), None);
        let members = room.members.len();
        drop(room);

        tracing::info!(%conn, room = room_id, username, inserted, members, "joined");
        self.spawn_backfill(conn, room_id.to_owned(), requested_at);
        Ok(())
    }

    /// Client-requested leave. Leaving a room the connection is not in is a
    /// no-op.
    pub async fn leave(&self, conn: ConnId, room_id: &str) -> RelayResult<()> {
        require("roomId", room_id)?;

        if self.registry.current_room(conn).as_deref() == Some(room_id) {
            self.leave_room(conn, room_id, EndReason::Left).await;
        }
        Ok(())
    }

    pub(crate) async fn leave_room(&self, conn: ConnId, room_id: &str, reason: EndReason) {
        self.registry.dissociate(conn, room_id);

        let Some(mut room) = self.lock_existing(room_id).await else {
            return;
        };

        self.end_call_held_by(&mut room, conn, reason);

        if room.remove(conn) {
            self.broadcast(&room, ServerEvent::UpdateUserList(room.roster()), None);
            tracing::info!(%conn, room = room_id, members = room.members.len(), "left");
        }

        if room.is_empty() {
            self.discard_room(&mut room);
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn upsert_keeps_position() {
        let mut room = Room::new("r1");
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        assert!(room.upsert(a, "alice"));
        assert!(room.upsert(b, "bob"));
        assert!(!room.upsert(a, "alicia"));

        let names: Vec<_> = room.roster().into_iter().map(|e| e.username).collect();
        assert_eq!(names, ["alicia", "bob"]);
    }

    #[test]
    fn remove_reports_membership() {
        let mut room = Room::new("r1");
        let a = Uuid::now_v7();
        room.upsert(a, "alice");
        assert!(room.remove(a));
        assert!(!room.remove(a));
        assert!(room.is_empty());
    }

    #[test]
    fn blank_fields_rejected() {
        assert!(require("roomId", "  ").is_err());
        assert!(require("roomId", "r1").is_ok());
    }
}
