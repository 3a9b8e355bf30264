use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

use crate::{db::{now_ms, StoredMessage}, events::RosterEntry, AppResult, Config, MessageStore};

use super::{CallStatus, Hub};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomInfo {
    room_id: String,
    members: Vec<RosterEntry>,
    call: Option<CallStatus>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(hub): State<Arc<Hub>>,
    Path(room_id): Path<String>,
) -> AppResult<Response> {
    let Some((members, call)) = hub.snapshot(&room_id).await else {
        return Ok((StatusCode::NOT_FOUND, format!("{room_id} has nobody in it")).into_response());
    };
    let call = call.map(|call| call.status);

    Ok(Json(RoomInfo { room_id, members, call }).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_messages(
    State(store): State<MessageStore>,
    State(config): State<Arc<Config>>,
    Path(room_id): Path<String>,
) -> AppResult<Json<Vec<StoredMessage>>> {
    let messages = store.recent(&room_id, config.history_limit, now_ms()).await?;
    Ok(Json(messages))
}
