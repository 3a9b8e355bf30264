use std::sync::Arc;

use crate::{
    db::StoredMessage,
    events::ServerEvent,
    ConnId, RelayError, RelayResult,
};

use super::Hub;

impl Hub {
    /// Persists the message, then relays it to every other member of the
    /// room. Nothing is relayed if the store rejects the write.
    ///
    /// `sender` must be the name the connection joined with.
    pub async fn send_message(
        &self,
        conn: ConnId,
        room_id: &str,
        sender: &str,
        content: &str,
    ) -> RelayResult<StoredMessage> {
        if room_id.trim().is_empty() || sender.trim().is_empty() {
            return Err(RelayError::Validation("roomId and sender are required".to_owned()));
        }

        if self.registry.current_room(conn).as_deref() != Some(room_id) {
            return Err(RelayError::Validation(format!("not a member of room {room_id}")));
        }

        if self.registry.display_name(conn).as_deref() != Some(sender) {
            return Err(RelayError::Validation(format!("sender {sender} does not match joined name")));
        }

        let message = self.store.persist(room_id, sender, content).await.map_err(|err| {
            tracing::warn!(%conn, room = room_id, error = %err, "persist failed, message not relayed");
            RelayError::from(err)
        })?;

        // the room may have emptied while the write was in flight
        if let Some(room) = self.lock_existing(room_id).await {
            self.broadcast(&room, ServerEvent::ReceiveMessage(message.clone()), Some(conn));
        }

        tracing::debug!(%conn, room = room_id, id = message.id, "relayed");
        Ok(message)
    }

    pub(crate) fn spawn_backfill(self: &Arc<Self>, conn: ConnId, room_id: String, requested_at: i64) {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            hub.backfill(conn, &room_id, requested_at).await;
        });
    }

    /// Sends the joiner the most recent history that existed when it asked
    /// to join, as a single batch.
    ///
    /// Messages persisted inside the tolerance window may also have reached
    /// the joiner live as `receive_message`. Both copies carry the same store
    /// id, which is what clients dedupe on.
    pub async fn backfill(&self, conn: ConnId, room_id: &str, requested_at: i64) {
        let tolerance = i64::try_from(self.config.history_tolerance.as_millis()).unwrap_or(i64::MAX);
        let until = requested_at.saturating_add(tolerance);

        match self.store.recent(room_id, self.config.history_limit, until).await {
            Ok(history) => {
                tracing::debug!(%conn, room = room_id, count = history.len(), "backfill");
                self.registry.send(conn, ServerEvent::LoadOldMessages(history));
            }
            Err(err) => {
                tracing::warn!(%conn, room = room_id, error = %err, "backfill failed");
                self.registry.send(conn, RelayError::from(err).to_event());
            }
        }
    }
}
