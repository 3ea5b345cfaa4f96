/// Atomic key-value store abstraction and its backends.
pub mod counter_store;
/// Logical key layout for room state.
pub mod keys;
/// Persisted room and participant records.
pub mod models;
/// Repository over the keys of a room.
pub mod room;
/// Backend-agnostic storage errors.
pub mod storage;
