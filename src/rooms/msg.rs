use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    auth::Member,
    db::{Message, Rooms, StoredMessage},
    realtime::{Fanout, RoomEvent},
    AppError, AppResult, AppState,
};

pub(crate) const MAX_SENDER_CHARS: usize = 100;
pub(crate) const MAX_TEXT_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageBody {
    sender: String,
    text: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct MessageList {
    messages: Vec<StoredMessage>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_msgs(member: Member, State(rooms): State<Rooms>) -> AppResult<Json<MessageList>> {
    let messages = rooms.messages(&member.room_id, &member.token).await?;
    Ok(Json(MessageList { messages }))
}

/// The sender name is whatever the client claims; only the token is checked.
#[debug_handler(state = AppState)]
pub(crate) async fn send_msg(
    member: Member,
    State(rooms): State<Rooms>,
    State(fanout): State<Fanout>,

    Json(SendMessageBody { sender, text }): Json<SendMessageBody>,
) -> AppResult<Json<Message>> {
    let sender = checked("sender", &sender, MAX_SENDER_CHARS)?;
    let text = checked("text", &text, MAX_TEXT_CHARS)?;

    let Some(message) = rooms.push_message(&member.room_id, &member.token, sender, text).await? else {
        // Destroyed or expired after the guard ran.
        return Err(AppError::RoomNotFound);
    };

    fanout.publish(&member.room_id, RoomEvent::Message(message.clone()));
    Ok(Json(message))
}

fn checked<'a>(field: &str, value: &'a str, max_chars: usize) -> AppResult<&'a str> {
    let value = value.trim();
    let chars = value.chars().count();
    if chars == 0 || chars > max_chars {
        return Err(format!("{field} must be 1 to {max_chars} characters").into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_bounds() {
        assert_eq!(checked("text", "  hi  ", 10).unwrap(), "hi");
        assert!(checked("text", "   ", 10).is_err());
        assert!(checked("text", &"x".repeat(11), 10).is_err());
        assert!(checked("text", &"é".repeat(10), 10).is_ok());
    }
}
