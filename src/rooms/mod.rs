mod room;
mod msg;
mod new;
mod ws;

use axum::{middleware, routing::{delete, get, post}, Router};

use crate::{auth, AppState};

/// Room API, mounted under `/api`. Everything but creation requires membership.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/room/create", post(new::new_room))
        .route("/room/ttl", get(room::ttl))
        .route("/room", delete(room::destroy))
        .route("/messages", get(msg::list_msgs).post(msg::send_msg))
        .route("/realtime", get(ws::room_ws))
}

/// Room pages, each behind the access gateway.
pub fn pages(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/room/{room_id}", get(room::room))
        .route_layer(middleware::from_fn_with_state(state, auth::gateway))
}
