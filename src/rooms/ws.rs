use axum::{
    debug_handler,
    extract::{ws::{Message as WsMessage, WebSocket}, Query, State, WebSocketUpgrade},
    response::Response,
};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;

use crate::{
    auth::Member,
    realtime::{EventKind, Fanout, RoomEvent},
    token::RoomId,
    AppResult, AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct EventsQuery {
    events: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    member: Member,
    State(fanout): State<Fanout>,
    Query(EventsQuery { events }): Query<EventsQuery>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let kinds = parse_kinds(events.as_deref())?;

    // Subscribe before the handshake so nothing published meanwhile is lost.
    let events = fanout.subscribe(member.room_id.clone(), &kinds);
    let room_id = member.room_id;

    Ok(ws.on_upgrade(move |socket| forward(socket, events, room_id)))
}

/// `chat.message,chat.destroy`; empty or absent means both.
pub(crate) fn parse_kinds(events: Option<&str>) -> AppResult<Vec<EventKind>> {
    let kinds = events
        .unwrap_or_default()
        .split(',')
        .filter(|name| !name.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<EventKind>, String>>()?;

    if kinds.is_empty() {
        return Ok(EventKind::ALL.to_vec());
    }
    Ok(kinds)
}

async fn forward(socket: WebSocket, events: impl Stream<Item = RoomEvent> + Send + 'static, room_id: RoomId) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = Box::pin(events);

    let mut push_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let destroyed = event.kind() == EventKind::Destroy;
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };

            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
            if destroyed {
                let _ = sender.send(WsMessage::Close(None)).await;
                break;
            }
        }
    });

    // Nothing is accepted from clients; reading only notices hang-ups.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, WsMessage::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut push_task => recv_task.abort(),
        _ = &mut recv_task => push_task.abort(),
    };

    tracing::debug!(room = %room_id, "realtime subscriber left");
}
