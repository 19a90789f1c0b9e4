//! Vigil presence hub library.
//!
//! Exposes the hub server for use in tests and embedding. The hub accepts
//! WebSocket connections bound to a user identity, keeps the authoritative
//! presence store, and fans every change out to all connected clients.

pub mod config;
pub mod hub;
pub mod store;
