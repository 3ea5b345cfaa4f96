/// Multiplexed room action payloads.
pub mod action;
/// Health check payloads.
pub mod health;
/// Room, participant and snapshot payloads.
pub mod room;
/// Custom field validators.
pub mod validation;
