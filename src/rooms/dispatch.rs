use std::sync::Arc;

use serde_json::Value;

use crate::{
    events::{CALL_USER, END_CALL, ICE_CANDIDATE, JOIN_ROOM, LEAVE_ROOM, MAKE_ANSWER, SEND_MESSAGE},
    ConnId, GetField, RelayError, RelayResult,
};

use super::Hub;

impl Hub {
    /// Handles one inbound frame from `conn`. A failure is reported to
    /// `conn` alone and leaves every other room and connection untouched.
    pub async fn dispatch(self: &Arc<Self>, conn: ConnId, raw: &str) {
        if let Err(err) = self.route(conn, raw).await {
            tracing::debug!(%conn, kind = err.kind(), error = %err, "event rejected");
            self.registry.send(conn, err.to_event());
        }
    }

    async fn route(self: &Arc<Self>, conn: ConnId, raw: &str) -> RelayResult<()> {
        let frame: Value = serde_json::from_str(raw)
            .map_err(|err| RelayError::Validation(format!("malformed frame: {err}")))?;
        let event = frame.get_str_field("event")?;
        let data = frame.get_obj_field("data")?;

        tracing::trace!(%conn, event = %event, "dispatch");

        match event.as_str() {
            JOIN_ROOM => {
                self.join(conn, &data.get_str_field("roomId")?, &data.get_str_field("username")?)
                    .await
            }
            LEAVE_ROOM => self.leave(conn, &data.get_str_field("roomId")?).await,
            SEND_MESSAGE => {
                // client timestamps are ignored, creation time is ours
                self.send_message(
                    conn,
                    &data.get_str_field("roomId")?,
                    &data.get_str_field("sender")?,
                    &data.get_str_field("content")?,
                )
                .await
                .map(|_| ())
            }
            CALL_USER => {
                self.call_user(conn, data.get_id_field("to")?, data.get_obj_field("offer")?.clone())
                    .await
            }
            MAKE_ANSWER => {
                self.make_answer(conn, data.get_id_field("to")?, data.get_obj_field("answer")?.clone())
                    .await
            }
            ICE_CANDIDATE => {
                self.ice_candidate(conn, data.get_id_field("to")?, data.get_obj_field("candidate")?.clone())
                    .await
            }
            END_CALL => self.end_call(conn, &data.get_str_field("roomId")?).await,
            other => Err(RelayError::Validation(format!("unknown event {other}"))),
        }
    }
}
