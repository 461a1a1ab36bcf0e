use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

use crate::{db::Rooms, token::{RoomId, Token}, AppError, AppResult};

use super::read_token;

#[derive(Debug, Deserialize)]
pub(crate) struct RoomQuery {
    #[serde(rename = "roomId")]
    pub(crate) room_id: Option<String>,
}

/// A caller whose token is currently registered for the room named in `?roomId=`.
///
/// Extracting this is the authorization check for every room API call.
/// Membership is re-read from the store on each request, so a destroyed room
/// stops accepting its old tokens immediately.
#[derive(Debug, Clone)]
pub struct Member {
    pub room_id: RoomId,
    pub token: Token,
    /// Membership snapshot taken during the check.
    pub connected: Vec<Token>,
}

/// Read-only. A missing room and a foreign token both come back as
/// `Unauthorized`.
pub async fn check_membership(rooms: &Rooms, room_id: Option<RoomId>, token: Option<Token>) -> AppResult<Member> {
    let (Some(room_id), Some(token)) = (room_id, token) else {
        tracing::debug!("rejected: missing roomId or token");
        return Err(AppError::Unauthorized);
    };

    let Some(meta) = rooms.get(&room_id).await? else {
        tracing::debug!(room = %room_id, "rejected: no such room");
        return Err(AppError::Unauthorized);
    };

    if !meta.is_member(&token) {
        tracing::debug!(room = %room_id, "rejected: token not registered");
        return Err(AppError::Unauthorized);
    }

    Ok(Member {
        room_id,
        token,
        connected: meta.connected,
    })
}

impl<S> FromRequestParts<S> for Member
where
    Rooms: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(RoomQuery { room_id }) = Query::<RoomQuery>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let room_id = room_id.filter(|id| !id.is_empty()).map(RoomId::from);
        let token = read_token(&parts.headers);

        check_membership(&Rooms::from_ref(state), room_id, token).await
    }
}
