//! Realtime delivery for LockBox: a per-identity registry of live
//! connections and the WebSocket loop that feeds them.

pub mod connection;
pub mod dispatcher;
