//! Merge rules between optimistic local taps and polled server totals.
//!
//! The displayed total never moves backward except on a confirmed reset: every
//! poll sets it to `max(displayed, server + pending)`, where `pending` counts
//! local taps issued so far. `pending` is only cleared by a reset, never on
//! confirmation; the `max` keeps it harmless once the server catches up.

use crate::dto::room::ParticipantDto;

/// What a poll changed besides the displayed total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// The room flipped from open to completed with this poll.
    pub completed_now: bool,
    /// The server reported a zero total on an open room.
    pub reset_confirmed: bool,
}

/// Displayed-total state of one room session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciler {
    visual_total: u64,
    pending_taps: u64,
    was_completed: bool,
}

impl Reconciler {
    /// Fresh state: nothing displayed, nothing pending, not yet seen completed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total to display.
    pub fn visual_total(&self) -> u64 {
        self.visual_total
    }

    /// Local taps issued since the last reset.
    pub fn pending_taps(&self) -> u64 {
        self.pending_taps
    }

    /// Completion flag of the previous poll.
    pub fn was_completed(&self) -> bool {
        self.was_completed
    }

    /// Merge a polled `server_total` and completion flag.
    pub fn observe(&mut self, server_total: u64, is_completed: bool) -> Observation {
        let reset_confirmed = server_total == 0 && !is_completed;
        if reset_confirmed {
            self.visual_total = 0;
            self.pending_taps = 0;
        } else {
            self.visual_total = self
                .visual_total
                .max(server_total.saturating_add(self.pending_taps));
        }

        let completed_now = is_completed && !self.was_completed;
        self.was_completed = is_completed;

        Observation {
            completed_now,
            reset_confirmed,
        }
    }

    /// Record an optimistic local tap.
    pub fn tap(&mut self) {
        self.pending_taps += 1;
        self.visual_total += 1;
    }

    /// Record a local reset intent. The completion edge tracker is left alone.
    pub fn reset(&mut self) {
        self.visual_total = 0;
        self.pending_taps = 0;
    }
}

/// Order participants by personal count, highest first. Ties keep their
/// incoming (join) order.
pub fn sort_participants(participants: &mut [ParticipantDto]) {
    participants.sort_by(|a, b| b.personal_count.cmp(&a.personal_count));
}
