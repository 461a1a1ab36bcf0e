use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    config::Config,
    db::{Registration, Rooms},
    token::{self, RoomId},
    AppResult,
};

use super::{read_token, token_cookie};

pub const ROOM_NOT_FOUND_URL: &str = "/?error=room-not-found";
pub const ROOM_FULL_URL: &str = "/?error=room-full";

/// Runs in front of every room page.
///
/// Returning visitors pass through untouched. Anyone else gets a fresh token
/// registered for the room and set as a cookie on the page response. The
/// only path that ever adds tokens to a room.
pub async fn gateway(
    State(rooms): State<Rooms>,
    State(config): State<Arc<Config>>,
    Path(room_id): Path<String>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    let room_id = RoomId::from(room_id);

    let Some(meta) = rooms.get(&room_id).await? else {
        tracing::info!(room = %room_id, "visit to unknown room");
        return Ok(Redirect::to(ROOM_NOT_FOUND_URL).into_response());
    };

    if let Some(existing) = read_token(request.headers()) {
        if meta.is_member(&existing) {
            return Ok(next.run(request).await);
        }
    }

    let token = token::issue();
    match rooms.atomic_add_token(&room_id, &token, config.room_capacity).await? {
        Registration::Registered | Registration::AlreadyMember => {
            tracing::info!(room = %room_id, "visitor registered");
        }
        Registration::RoomAbsent => {
            tracing::info!(room = %room_id, "room vanished during registration");
            return Ok(Redirect::to(ROOM_NOT_FOUND_URL).into_response());
        }
        Registration::RoomFull => {
            tracing::info!(room = %room_id, "room full, visitor turned away");
            return Ok(Redirect::to(ROOM_FULL_URL).into_response());
        }
    }

    let cookie = token_cookie(&token, &config)?;
    let mut response = next.run(request).await;
    response.headers_mut().append(header::SET_COOKIE, cookie);

    Ok(response)
}
