//! Room store on SQLite.
//!
//! A room exists iff its `rooms` row is present and `expires_at` is in the
//! future. Expired rows are invisible to every read even before
//! [`Rooms::sweep_expired`] removes them. Tokens and messages hang off the
//! room row with `ON DELETE CASCADE`, so one delete removes the whole room.

use std::{str::FromStr, time::Duration};

use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{include_res, token::{RoomId, Token}};

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMeta {
    /// In registration order.
    pub connected: Vec<Token>,
    pub created_at: i64,
}

impl RoomMeta {
    pub fn is_member(&self, token: &Token) -> bool {
        self.connected.contains(token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyMember,
    RoomAbsent,
    RoomFull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: RoomId,
    pub sender: String,
    pub text: String,
    /// Milliseconds since the epoch, stamped on receipt.
    pub timestamp: i64,
}

/// A message as seen by one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub own: bool,
}

#[derive(Clone)]
pub struct Rooms {
    pool: SqlitePool,
}

impl Rooms {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Rooms, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Single long-lived connection, since every in-memory connection is its own database.
    pub async fn in_memory() -> Result<Rooms, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Rooms, sqlx::Error> {
        sqlx::raw_sql(include_res!(str, "/schema.sql"))
            .execute(&pool)
            .await?;

        Ok(Rooms { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn create(&self, room_id: &RoomId, expiry: Duration) -> Result<(), sqlx::Error> {
        let now = now_millis();
        let expires_at = now.saturating_add(expiry.as_millis().min(i64::MAX as u128) as i64);

        sqlx::query("INSERT INTO rooms (room_id,created_at,expires_at) VALUES (?,?,?)")
            .bind(room_id.as_str())
            .bind(now)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get(&self, room_id: &RoomId) -> Result<Option<RoomMeta>, sqlx::Error> {
        let now = now_millis();

        let Some((created_at,)): Option<(i64,)> =
            sqlx::query_as("SELECT created_at FROM rooms WHERE room_id=? AND expires_at>?")
                .bind(room_id.as_str())
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };

        let connected: Vec<(String,)> =
            sqlx::query_as("SELECT token FROM room_tokens WHERE room_id=? ORDER BY joined_at, rowid")
                .bind(room_id.as_str())
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(RoomMeta {
            connected: connected.into_iter().map(|(token,)| Token::from(token)).collect(),
            created_at,
        }))
    }

    /// Adds `token` to the room's set in one conditional insert, so concurrent
    /// registrations never clobber each other.
    pub async fn atomic_add_token(
        &self,
        room_id: &RoomId,
        token: &Token,
        capacity: Option<u32>,
    ) -> Result<Registration, sqlx::Error> {
        let now = now_millis();

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO room_tokens (room_id,token,joined_at) \
             SELECT room_id,?2,?3 FROM rooms \
             WHERE room_id=?1 AND expires_at>?3 \
             AND (?4 IS NULL OR (SELECT COUNT(*) FROM room_tokens WHERE room_id=?1) < ?4)",
        )
        .bind(room_id.as_str())
        .bind(token.as_str())
        .bind(now)
        .bind(capacity.map(i64::from))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(Registration::Registered);
        }

        // Nothing inserted: find out which precondition failed.
        Ok(match self.get(room_id).await? {
            None => Registration::RoomAbsent,
            Some(meta) if meta.is_member(token) => Registration::AlreadyMember,
            Some(_) => Registration::RoomFull,
        })
    }

    /// Whole seconds until expiry, rounded up; `None` once absent.
    pub async fn ttl_seconds(&self, room_id: &RoomId) -> Result<Option<u64>, sqlx::Error> {
        let now = now_millis();

        let expires_at: Option<(i64,)> = sqlx::query_as("SELECT expires_at FROM rooms WHERE room_id=? AND expires_at>?")
            .bind(room_id.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(expires_at.map(|(expires_at,)| ((expires_at - now) as u64).div_ceil(1000)))
    }

    /// Returns whether there was a room row to remove.
    pub async fn delete(&self, room_id: &RoomId) -> Result<bool, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM rooms WHERE room_id=?")
            .bind(room_id.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    /// Appends a message unless the room has vanished in the meantime.
    pub async fn push_message(
        &self,
        room_id: &RoomId,
        token: &Token,
        sender: &str,
        text: &str,
    ) -> Result<Option<Message>, sqlx::Error> {
        let message = Message {
            id: Uuid::new_v4().simple().to_string(),
            room_id: room_id.clone(),
            sender: sender.to_owned(),
            text: text.to_owned(),
            timestamp: now_millis(),
        };

        let inserted = sqlx::query(
            "INSERT INTO messages (id,room_id,token,sender,text,timestamp) \
             SELECT ?,room_id,?,?,?,? FROM rooms WHERE room_id=? AND expires_at>?",
        )
        .bind(&message.id)
        .bind(token.as_str())
        .bind(&message.sender)
        .bind(&message.text)
        .bind(message.timestamp)
        .bind(room_id.as_str())
        .bind(message.timestamp)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok((inserted == 1).then_some(message))
    }

    pub async fn messages(&self, room_id: &RoomId, viewer: &Token) -> Result<Vec<StoredMessage>, sqlx::Error> {
        let rows: Vec<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT m.id,m.token,m.sender,m.text,m.timestamp FROM messages m \
             JOIN rooms r ON r.room_id=m.room_id \
             WHERE m.room_id=? AND r.expires_at>? ORDER BY m.seq",
        )
        .bind(room_id.as_str())
        .bind(now_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, token, sender, text, timestamp)| StoredMessage {
                own: token == viewer.as_str(),
                message: Message {
                    id,
                    room_id: room_id.clone(),
                    sender,
                    text,
                    timestamp,
                },
            })
            .collect())
    }

    /// Store-driven expiry. Returns the number of rooms removed.
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        Ok(sqlx::query("DELETE FROM rooms WHERE expires_at<=?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?
            .rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::token;

    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn room() -> (Rooms, RoomId) {
        let rooms = Rooms::in_memory().await.unwrap();
        let room_id = RoomId::generate();
        rooms.create(&room_id, HOUR).await.unwrap();
        (rooms, room_id)
    }

    #[tokio::test]
    async fn new_room_is_empty() {
        let (rooms, room_id) = room().await;
        let meta = rooms.get(&room_id).await.unwrap().unwrap();
        assert!(meta.connected.is_empty());
        assert!(meta.created_at <= now_millis());
    }

    #[tokio::test]
    async fn registering_twice_is_idempotent() {
        let (rooms, room_id) = room().await;
        let token = token::issue();

        assert_eq!(rooms.atomic_add_token(&room_id, &token, None).await.unwrap(), Registration::Registered);
        assert_eq!(rooms.atomic_add_token(&room_id, &token, None).await.unwrap(), Registration::AlreadyMember);

        let meta = rooms.get(&room_id).await.unwrap().unwrap();
        assert_eq!(meta.connected, vec![token]);
    }

    #[tokio::test]
    async fn registration_preserves_order() {
        let (rooms, room_id) = room().await;
        let tokens: Vec<Token> = (0..5).map(|_| token::issue()).collect();
        for token in &tokens {
            rooms.atomic_add_token(&room_id, token, None).await.unwrap();
        }

        assert_eq!(rooms.get(&room_id).await.unwrap().unwrap().connected, tokens);
    }

    #[tokio::test]
    async fn registration_against_missing_room() {
        let rooms = Rooms::in_memory().await.unwrap();
        let outcome = rooms
            .atomic_add_token(&RoomId::from("nowhere"), &token::issue(), None)
            .await
            .unwrap();
        assert_eq!(outcome, Registration::RoomAbsent);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let (rooms, room_id) = room().await;
        let first = token::issue();

        assert_eq!(rooms.atomic_add_token(&room_id, &first, Some(2)).await.unwrap(), Registration::Registered);
        assert_eq!(rooms.atomic_add_token(&room_id, &token::issue(), Some(2)).await.unwrap(), Registration::Registered);
        assert_eq!(rooms.atomic_add_token(&room_id, &token::issue(), Some(2)).await.unwrap(), Registration::RoomFull);
        // Members are still recognised once the room is full.
        assert_eq!(rooms.atomic_add_token(&room_id, &first, Some(2)).await.unwrap(), Registration::AlreadyMember);
    }

    #[tokio::test]
    async fn delete_cascades() {
        let (rooms, room_id) = room().await;
        let token = token::issue();
        rooms.atomic_add_token(&room_id, &token, None).await.unwrap();
        rooms.push_message(&room_id, &token, "anon", "hi").await.unwrap().unwrap();

        assert!(rooms.delete(&room_id).await.unwrap());
        assert!(rooms.get(&room_id).await.unwrap().is_none());
        assert!(rooms.messages(&room_id, &token).await.unwrap().is_empty());
        assert!(!rooms.delete(&room_id).await.unwrap());

        let (orphans,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM room_tokens")
            .fetch_one(&rooms.pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn ttl_counts_down() {
        let (rooms, room_id) = room().await;
        let first = rooms.ttl_seconds(&room_id).await.unwrap().unwrap();
        assert!(first <= HOUR.as_secs() && first >= HOUR.as_secs() - 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = rooms.ttl_seconds(&room_id).await.unwrap().unwrap();
        assert!(second <= first);
    }

    #[tokio::test]
    async fn expired_rooms_are_absent_before_sweeping() {
        let rooms = Rooms::in_memory().await.unwrap();
        let room_id = RoomId::generate();
        rooms.create(&room_id, Duration::ZERO).await.unwrap();

        assert!(rooms.get(&room_id).await.unwrap().is_none());
        assert!(rooms.ttl_seconds(&room_id).await.unwrap().is_none());
        assert_eq!(
            rooms.atomic_add_token(&room_id, &token::issue(), None).await.unwrap(),
            Registration::RoomAbsent
        );
        assert_eq!(rooms.sweep_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn messages_keep_receipt_order_and_mark_own() {
        let (rooms, room_id) = room().await;
        let alice = token::issue();
        let bob = token::issue();

        rooms.push_message(&room_id, &alice, "alice", "one").await.unwrap();
        rooms.push_message(&room_id, &bob, "bob", "two").await.unwrap();

        let seen = rooms.messages(&room_id, &alice).await.unwrap();
        let texts: Vec<&str> = seen.iter().map(|m| m.message.text.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);
        assert!(seen[0].own);
        assert!(!seen[1].own);
    }

    #[tokio::test]
    async fn push_into_missing_room_is_refused() {
        let rooms = Rooms::in_memory().await.unwrap();
        let pushed = rooms
            .push_message(&RoomId::from("gone"), &token::issue(), "x", "y")
            .await
            .unwrap();
        assert!(pushed.is_none());
    }
}
