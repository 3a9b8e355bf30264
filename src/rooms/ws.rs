use std::sync::Arc;

use axum::{debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use tokio::{runtime::Handle, sync::mpsc};

use crate::ConnId;

use super::Hub;

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(hub): State<Arc<Hub>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| serve_socket(hub, stream).await)
}

/// Runs disconnect cleanup for `conn` exactly once: through [`finish`] on a
/// clean exit, or from `Drop` when the socket task panics or is cancelled.
///
/// [`finish`]: ReleaseOnDrop::finish
pub(crate) struct ReleaseOnDrop {
    hub: Option<Arc<Hub>>,
    conn: ConnId,
}

impl ReleaseOnDrop {
    pub(crate) fn new(hub: Arc<Hub>, conn: ConnId) -> Self {
        Self { hub: Some(hub), conn }
    }

    /// Cleans up on a task of its own and waits for it. The spawned task
    /// keeps running even if this future is dropped.
    pub(crate) async fn finish(mut self) {
        let Some(hub) = self.hub.take() else {
            return;
        };

        let conn = self.conn;
        let cleanup = tokio::spawn(async move { hub.release(conn).await });
        if let Err(err) = cleanup.await {
            tracing::error!(%conn, error = %err, "disconnect cleanup failed");
        }
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let Some(hub) = self.hub.take() else {
            return;
        };

        let conn = self.conn;
        match Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(%conn, "connection task ended abruptly, releasing");
                handle.spawn(async move { hub.release(conn).await });
            }
            Err(_) => tracing::error!(%conn, "no runtime left to release connection"),
        }
    }
}

async fn serve_socket(hub: Arc<Hub>, stream: WebSocket) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = hub.register(tx);
    let release = ReleaseOnDrop::new(Arc::clone(&hub), conn);
    let (mut sender, mut receiver) = stream.split();

    let mut outbound_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(%conn, error = %err, "could not encode event");
                    continue;
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => hub.dispatch(conn, text.as_str()).await,
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => hub.dispatch(conn, text).await,
                Err(_) => tracing::debug!(%conn, "ignoring non-utf8 frame"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    release.finish().await;

    tokio::select! {
        _ = &mut outbound_task => {},
        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => outbound_task.abort(),
    };
}
