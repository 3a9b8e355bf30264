//! Wire vocabulary. Every frame is `{"event": <kind>, "data": <payload>}`.

use serde::Serialize;
use serde_json::Value;

use crate::{db::StoredMessage, ConnId};

pub const JOIN_ROOM: &str = "join_room";
pub const LEAVE_ROOM: &str = "leave_room";
pub const SEND_MESSAGE: &str = "send_message";
pub const CALL_USER: &str = "call-user";
pub const MAKE_ANSWER: &str = "make-answer";
pub const ICE_CANDIDATE: &str = "ice-candidate";
pub const END_CALL: &str = "end-call";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub id: ConnId,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Hangup,
    Left,
    Disconnect,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected { id: ConnId },
    #[serde(rename = "update_user_list")]
    UpdateUserList(Vec<RosterEntry>),
    /// Room history up to shortly after the join. A message sent during that
    /// window can arrive here and as `receive_message`; dedupe by `id`.
    #[serde(rename = "load_old_messages")]
    LoadOldMessages(Vec<StoredMessage>),
    #[serde(rename = "receive_message")]
    ReceiveMessage(StoredMessage),
    #[serde(rename = "message_error")]
    MessageError { message: String },
    #[serde(rename = "call-made")]
    CallMade { offer: Value, from: ConnId, username: Option<String> },
    #[serde(rename = "answer-made")]
    AnswerMade { answer: Value, from: ConnId },
    #[serde(rename = "ice-candidate")]
    IceCandidate { candidate: Value, from: ConnId },
    #[serde(rename = "call_in_progress")]
    CallInProgress { room_id: String, caller: ConnId, callee: ConnId },
    #[serde(rename = "call_ended")]
    CallEnded { room_id: String, reason: EndReason },
    #[serde(rename = "call_busy")]
    CallBusy { room_id: String },
    #[serde(rename = "call_timeout")]
    CallTimeout { to: ConnId },
    #[serde(rename = "peer_unavailable")]
    PeerUnavailable { to: ConnId },
    #[serde(rename = "error")]
    Error { kind: String, message: String },
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn roster_frame_shape() {
        let id = Uuid::now_v7();
        let ev = ServerEvent::UpdateUserList(vec![RosterEntry { id, username: "alice".into() }]);
        let v: Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(v, json!({
            "event": "update_user_list",
            "data": [{ "id": id.to_string(), "username": "alice" }],
        }));
    }

    #[test]
    fn struct_payloads_are_camel_case() {
        let ev = ServerEvent::CallEnded { room_id: "r1".into(), reason: EndReason::Disconnect };
        let v: Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(v, json!({
            "event": "call_ended",
            "data": { "roomId": "r1", "reason": "disconnect" },
        }));
    }

    #[test]
    fn signaling_payload_is_passed_through() {
        let from = Uuid::now_v7();
        let offer = json!({ "type": "offer", "sdp": "v=0\r\n" });
        let ev = ServerEvent::CallMade { offer: offer.clone(), from, username: Some("bob".into()) };
        let v: Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(v["event"], "call-made");
        assert_eq!(v["data"]["offer"], offer);
        assert_eq!(v["data"]["from"], from.to_string());
    }
}
