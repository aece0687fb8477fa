//! Shared types for the LockBox server crates: wire DTOs, realtime gateway
//! events, and the domain models the negotiator and envelope store work with.

pub mod api;
pub mod events;
pub mod models;
