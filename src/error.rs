use crate::{events::ServerEvent, ConnId};

pub type RelayResult<T> = Result<T, RelayError>;

/// Failure while handling a single inbound event. Reported to the
/// originating connection only; never fatal to other rooms or connections.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("message store unavailable: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("peer {0} is unavailable")]
    PeerUnavailable(ConnId),

    #[error("room {0} already has a call in progress")]
    RoomBusy(String),

    #[error("connection has not joined a room")]
    NotInRoom,

    #[error("no pending call to answer")]
    NoPendingCall,
}

impl RelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::Persistence(_) => "persistence",
            RelayError::PeerUnavailable(_) => "peer_unavailable",
            RelayError::RoomBusy(_) => "room_busy",
            RelayError::NotInRoom => "not_in_room",
            RelayError::NoPendingCall => "no_pending_call",
        }
    }

    /// The notice sent back to whoever triggered the failure.
    pub fn to_event(&self) -> ServerEvent {
        match self {
            RelayError::Persistence(_) => ServerEvent::MessageError {
                message: self.to_string(),
            },
            RelayError::PeerUnavailable(to) => ServerEvent::PeerUnavailable { to: *to },
            RelayError::RoomBusy(room_id) => ServerEvent::CallBusy {
                room_id: room_id.clone(),
            },
            _ => ServerEvent::Error {
                kind: self.kind().to_owned(),
                message: self.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn persistence_maps_to_message_error() {
        let err = RelayError::Persistence(sqlx::Error::PoolClosed);
        assert!(matches!(err.to_event(), ServerEvent::MessageError { .. }));
    }

    #[test]
    fn busy_room_maps_to_call_busy() {
        let err = RelayError::RoomBusy("r1".to_owned());
        assert_eq!(err.to_event(), ServerEvent::CallBusy { room_id: "r1".to_owned() });
    }

    #[test]
    fn missing_peer_names_target() {
        let to = Uuid::now_v7();
        assert_eq!(RelayError::PeerUnavailable(to).to_event(), ServerEvent::PeerUnavailable { to });
    }

    #[test]
    fn validation_maps_to_error_event() {
        let ServerEvent::Error { kind, message } = RelayError::Validation("expected roomId".into()).to_event() else {
            panic!("expected error event");
        };
        assert_eq!(kind, "validation");
        assert!(message.contains("roomId"));
    }
}
