use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{auth::Member, db::Rooms, include_res, lifecycle, realtime::Fanout, AppResult, AppState};

/// Only reached through the gateway, so `room_id` names a live room.
#[debug_handler]
pub(crate) async fn room(Path(room_id): Path<String>) -> Response {
    Html(
        include_res!(str, "/pages/room.html")
            .replace("{room_id}", &room_id)
    ).into_response()
}

#[debug_handler(state = AppState)]
pub(crate) async fn ttl(member: Member, State(rooms): State<Rooms>) -> AppResult<Response> {
    let ttl = lifecycle::ttl(&rooms, &member).await?;
    Ok(Json(json!({ "ttl": ttl })).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn destroy(
    member: Member,
    State(rooms): State<Rooms>,
    State(fanout): State<Fanout>,
) -> AppResult<StatusCode> {
    lifecycle::destroy(&rooms, &fanout, &member).await?;
    Ok(StatusCode::NO_CONTENT)
}
