//! One-call-per-room signaling: Idle -> Ringing -> Active -> Idle.
//!
//! Offers, answers and ICE candidates are opaque JSON blobs that are only
//! forwarded. Idle is represented by `Room::call == None`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    events::{EndReason, ServerEvent},
    ConnId, RelayError, RelayResult,
};

use super::{presence::Room, Hub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Ringing,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOccupancy {
    pub call_id: Uuid,
    pub caller: ConnId,
    pub target: ConnId,
    /// set once the target answers
    pub callee: Option<ConnId>,
    pub status: CallStatus,
}

impl CallOccupancy {
    pub fn involves(&self, id: ConnId) -> bool {
        self.caller == id || self.target == id
    }
}

impl Hub {
    /// Rings `to` with `offer`. Both parties must share a room and that room
    /// must be idle.
    pub async fn call_user(self: &Arc<Self>, from: ConnId, to: ConnId, offer: Value) -> RelayResult<()> {
        if from == to {
            return Err(RelayError::Validation("cannot call yourself".to_owned()));
        }

        let room_id = self.registry.current_room(from).ok_or(RelayError::NotInRoom)?;
        let mut room = self.lock_existing(&room_id).await.ok_or(RelayError::NotInRoom)?;

        if let Some(call) = &room.call {
            tracing::info!(room = %room_id, %from, busy_with = %call.caller, "call rejected, room busy");
            return Err(RelayError::RoomBusy(room_id));
        }

        if !room.contains(to) {
            return Err(RelayError::PeerUnavailable(to));
        }

        let username = self.registry.display_name(from);
        if !self.registry.send(to, ServerEvent::CallMade { offer, from, username }) {
            return Err(RelayError::PeerUnavailable(to));
        }

        let call_id = Uuid::now_v7();
        room.call = Some(CallOccupancy {
            call_id,
            caller: from,
            target: to,
            callee: None,
            status: CallStatus::Ringing,
        });
        drop(room);

        tracing::info!(room = %room_id, caller = %from, target = %to, %call_id, "ringing");
        self.spawn_ring_timer(room_id, call_id);
        Ok(())
    }

    /// The ringing target accepts the call placed by `to`.
    pub async fn make_answer(&self, from: ConnId, to: ConnId, answer: Value) -> RelayResult<()> {
        let room_id = self.registry.current_room(from).ok_or(RelayError::NotInRoom)?;
        let mut room = self.lock_existing(&room_id).await.ok_or(RelayError::NotInRoom)?;

        let Some(call) = room
            .call
            .as_mut()
            .filter(|c| c.status == CallStatus::Ringing && c.target == from && c.caller == to)
        else {
            return Err(RelayError::NoPendingCall);
        };

        call.callee = Some(from);
        call.status = CallStatus::Active;
        let call_id = call.call_id;

        if !self.registry.send(to, ServerEvent::AnswerMade { answer, from }) {
            room.call = None;
            return Err(RelayError::PeerUnavailable(to));
        }

        self.broadcast(
            &room,
            ServerEvent::CallInProgress { room_id: room_id.clone(), caller: to, callee: from },
            None,
        );
        tracing::info!(room = %room_id, caller = %to, callee = %from, %call_id, "call active");
        Ok(())
    }

    /// Forwards a candidate between the two parties of a call. Candidates
    /// outside of a call are dropped.
    pub async fn ice_candidate(&self, from: ConnId, to: ConnId, candidate: Value) -> RelayResult<()> {
        if !self.registry.contains(to) {
            return Err(RelayError::PeerUnavailable(to));
        }

        let room_id = self.registry.current_room(from).ok_or(RelayError::NotInRoom)?;
        let room = self.lock_existing(&room_id).await.ok_or(RelayError::NotInRoom)?;

        if !room.contains(to) {
            return Err(RelayError::PeerUnavailable(to));
        }

        if !room.call.as_ref().is_some_and(|c| c.involves(from) && c.involves(to)) {
            tracing::debug!(room = %room_id, %from, %to, "dropping candidate outside of a call");
            return Ok(());
        }

        if !self.registry.send(to, ServerEvent::IceCandidate { candidate, from }) {
            return Err(RelayError::PeerUnavailable(to));
        }
        Ok(())
    }

    /// Either party hangs up. Ending an idle room is a no-op.
    pub async fn end_call(&self, from: ConnId, room_id: &str) -> RelayResult<()> {
        if room_id.trim().is_empty() {
            return Err(RelayError::Validation("roomId must not be empty".to_owned()));
        }

        let Some(mut room) = self.lock_existing(room_id).await else {
            return Ok(());
        };

        let Some(call) = &room.call else {
            return Ok(());
        };

        if !call.involves(from) {
            return Err(RelayError::Validation(
                "only the call participants can end the call".to_owned(),
            ));
        }

        room.call = None;
        self.broadcast(
            &room,
            ServerEvent::CallEnded { room_id: room_id.to_owned(), reason: EndReason::Hangup },
            None,
        );
        tracing::info!(room = room_id, by = %from, "call ended");
        Ok(())
    }

    /// Clears the room's call if `conn` is a party to it and tells everyone
    /// else in the room.
    pub(crate) fn end_call_held_by(&self, room: &mut Room, conn: ConnId, reason: EndReason) {
        let Some(call) = room.call.take_if(|c| c.involves(conn)) else {
            return;
        };

        self.broadcast(
            room,
            ServerEvent::CallEnded { room_id: room.id.clone(), reason },
            Some(conn),
        );
        tracing::info!(room = %room.id, %conn, call_id = %call.call_id, ?reason, "call force-ended");
    }

    fn spawn_ring_timer(self: &Arc<Self>, room_id: String, call_id: Uuid) {
        let hub = Arc::clone(self);
        let timeout = self.config.ring_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            hub.expire_ring(&room_id, call_id).await;
        });
    }

    async fn expire_ring(&self, room_id: &str, call_id: Uuid) {
        let Some(mut room) = self.lock_existing(room_id).await else {
            return;
        };

        let Some(call) = room
            .call
            .take_if(|c| c.call_id == call_id && c.status == CallStatus::Ringing)
        else {
            return;
        };

        tracing::info!(room = room_id, caller = %call.caller, target = %call.target, %call_id, "ring expired");
        self.registry.send(call.caller, ServerEvent::CallTimeout { to: call.target });
        self.registry.send(
            call.target,
            ServerEvent::CallEnded { room_id: room_id.to_owned(), reason: EndReason::Timeout },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn involves_both_parties_only() {
        let (caller, target, other) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let call = CallOccupancy {
            call_id: Uuid::now_v7(),
            caller,
            target,
            callee: None,
            status: CallStatus::Ringing,
        };
        assert!(call.involves(caller));
        assert!(call.involves(target));
        assert!(!call.involves(other));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&CallStatus::Active).unwrap(), "\"active\"");
    }
}
