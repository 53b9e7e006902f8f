//! Shared types: configuration, errors and server payloads.

pub mod config;
pub mod errors;
pub mod models;
