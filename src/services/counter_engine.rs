//! Tap handling: atomic increments and the completion check that follows them.

use tracing::{debug, info};

use crate::{error::ServiceError, state::SharedState};

/// Outcome of a tap against a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// The tap was counted.
    Counted {
        /// Room total right after the increment.
        new_total: u64,
        /// Participant's personal count right after the increment.
        personal: u64,
        /// Whether this tap flagged the room as completed.
        completed_now: bool,
    },
    /// The room was already completed; nothing was written.
    AlreadyCompleted,
}

/// Whether `total` meets a positive `target`. A zero target never completes.
pub fn target_reached(target: u64, total: u64) -> bool {
    target > 0 && total >= target
}

/// Count one tap from `participant_id` in room `code`.
///
/// The completion flag is written with a plain check-then-act on the room
/// record. Concurrent taps crossing the target may all write it; every writer
/// stores `is_completed = true`, so the duplicates are harmless.
pub async fn tap(
    state: &SharedState,
    code: &str,
    participant_id: &str,
) -> Result<TapOutcome, ServiceError> {
    let rooms = state.rooms().await?;

    let Some(mut room) = rooms.find(code).await? else {
        return Err(ServiceError::NotFound("Room not found".into()));
    };
    if room.is_completed {
        debug!(%code, participant_id, "tap ignored; room already completed");
        return Ok(TapOutcome::AlreadyCompleted);
    }

    let counts = rooms.increment(code, participant_id).await?;

    let completed_now = target_reached(room.target_count, counts.total);
    if completed_now {
        room.is_completed = true;
        room.total_count = counts.total;
        rooms.save(&room).await?;
        info!(%code, total = counts.total, target = room.target_count, "room completed");
    }

    Ok(TapOutcome::Counted {
        new_total: counts.total,
        personal: counts.personal,
        completed_now,
    })
}
