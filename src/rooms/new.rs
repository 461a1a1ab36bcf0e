use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Serialize;

use crate::{config::Config, db::Rooms, lifecycle, token::RoomId, AppResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewRoom {
    room_id: RoomId,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    State(rooms): State<Rooms>,
    State(config): State<Arc<Config>>,
) -> AppResult<Json<NewRoom>> {
    let room_id = lifecycle::create(&rooms, config.room_ttl).await?;
    Ok(Json(NewRoom { room_id }))
}
