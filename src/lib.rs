//! Library crate for masbaha-back, exposing modules for binaries and integration tests.

pub mod client;
pub mod clock;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
