//! Per-room event fan-out.
//!
//! One process-wide broadcast channel carries every room's events; each
//! subscription filters by room and event kind. Delivery is at-most-once: a
//! subscriber that lags behind skips what it missed.

use std::{str::FromStr, sync::Arc};

use futures_util::{stream, Stream};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{db::Message, token::RoomId};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Destroy,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Message, EventKind::Destroy];

    pub fn name(self) -> &'static str {
        match self {
            EventKind::Message => "chat.message",
            EventKind::Destroy => "chat.destroy",
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "chat.message" => Ok(EventKind::Message),
            "chat.destroy" => Ok(EventKind::Destroy),
            other => Err(format!("unknown event kind {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum RoomEvent {
    #[serde(rename = "chat.message")]
    Message(Message),
    #[serde(rename = "chat.destroy", rename_all = "camelCase")]
    Destroy { is_destroyed: bool },
}

impl RoomEvent {
    pub fn destroyed() -> RoomEvent {
        RoomEvent::Destroy { is_destroyed: true }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RoomEvent::Message(_) => EventKind::Message,
            RoomEvent::Destroy { .. } => EventKind::Destroy,
        }
    }
}

#[derive(Debug)]
struct Envelope {
    room_id: RoomId,
    event: RoomEvent,
}

#[derive(Clone)]
pub struct Fanout {
    tx: broadcast::Sender<Arc<Envelope>>,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

impl Fanout {
    pub fn new() -> Fanout {
        Fanout {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Returns how many subscriptions (across all rooms) saw the event.
    pub fn publish(&self, room_id: &RoomId, event: RoomEvent) -> usize {
        let kind = event.kind();
        let receivers = self
            .tx
            .send(Arc::new(Envelope {
                room_id: room_id.clone(),
                event,
            }))
            .unwrap_or(0);

        tracing::debug!(room = %room_id, event = kind.name(), receivers, "published");
        receivers
    }

    /// Events for one room, starting from now. No replay.
    pub fn subscribe(&self, room_id: RoomId, kinds: &[EventKind]) -> impl Stream<Item = RoomEvent> + Send + use<> {
        let kinds = kinds.to_vec();
        let rx = self.tx.subscribe();

        stream::unfold(rx, move |mut rx| {
            let room_id = room_id.clone();
            let kinds = kinds.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(envelope) => {
                            if envelope.room_id == room_id && kinds.contains(&envelope.event.kind()) {
                                return Some((envelope.event.clone(), rx));
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(room = %room_id, skipped, "subscriber lagged, events dropped");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        })
    }
}
