//! Logical key layout. Every key belonging to a room is scoped by its code.

/// The four keys making up the persisted state of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomKeys {
    /// Serialized room record.
    pub room: String,
    /// Atomic running total.
    pub total: String,
    /// Append-only list of serialized participants.
    pub participants: String,
    /// Hash of participant id to personal count.
    pub personal_counts: String,
}

impl RoomKeys {
    /// Derive the key set for a room code.
    pub fn new(code: &str) -> Self {
        Self {
            room: format!("room:{code}"),
            total: format!("room:{code}:count"),
            participants: format!("room:{code}:participants"),
            personal_counts: format!("room:{code}:p_counts"),
        }
    }

    /// All keys sharing the room retention window.
    pub fn all(&self) -> [&str; 4] {
        [
            &self.room,
            &self.total,
            &self.participants,
            &self.personal_counts,
        ]
    }
}
