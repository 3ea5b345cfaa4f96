/// Tap counting and target completion.
pub mod counter_engine;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Joining rooms under unique names.
pub mod participant_ledger;
/// Room creation, snapshots, target updates and resets.
pub mod room_registry;
/// Counter store connection supervisor with backoff.
pub mod storage_supervisor;
