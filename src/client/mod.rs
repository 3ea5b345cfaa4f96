//! Reconciliation client: keeps a local, never-rewinding view of a room in step
//! with the backend by polling, while taps are counted optimistically.

/// Transport seam and the HTTP implementation.
pub mod api;
/// Pure merge rules between local taps and polled totals.
pub mod reconcile;
/// Poll loop and user intents for one open room.
pub mod session;

pub use api::{ClientError, ClientResult, RoomApi};
pub use session::{RoomSession, SessionConfig, SessionEvent, SessionStatus, SessionView};
