//! Room lifetime: creation, TTL, explicit destruction and store-driven expiry.
//!
//! Only explicit destruction publishes `chat.destroy`. Rooms removed by
//! expiry vanish silently; clients treat their TTL countdown hitting zero as
//! the same signal.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{
    auth::Member,
    db::Rooms,
    realtime::{Fanout, RoomEvent},
    token::RoomId,
    AppError, AppResult,
};

pub async fn create(rooms: &Rooms, ttl: Duration) -> AppResult<RoomId> {
    let room_id = RoomId::generate();
    rooms.create(&room_id, ttl).await?;

    tracing::info!(room = %room_id, ttl_secs = ttl.as_secs(), "room created");
    Ok(room_id)
}

/// Seconds left for a guarded caller; zero once the room is gone.
pub async fn ttl(rooms: &Rooms, member: &Member) -> AppResult<u64> {
    Ok(rooms.ttl_seconds(&member.room_id).await?.unwrap_or(0))
}

/// Deletes the room with its tokens and history, then tells every live
/// subscriber.
pub async fn destroy(rooms: &Rooms, fanout: &Fanout, member: &Member) -> AppResult<()> {
    if !rooms.delete(&member.room_id).await? {
        // Lost a race with another destroy or with expiry.
        return Err(AppError::RoomNotFound);
    }

    let notified = fanout.publish(&member.room_id, RoomEvent::destroyed());
    tracing::info!(room = %member.room_id, notified, "room destroyed");
    Ok(())
}

/// Periodically removes expired rooms. Runs until the runtime shuts down.
pub fn spawn_sweeper(rooms: Rooms, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match rooms.sweep_expired().await {
                Ok(0) => {}
                Ok(swept) => tracing::info!(swept, "expired rooms removed"),
                Err(sqlx::Error::PoolClosed) => break,
                Err(err) => tracing::warn!(error = %err, "expiry sweep failed"),
            }
        }
    })
}
