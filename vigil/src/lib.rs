//! Vigil — client-side presence, delivery and typing state for chat apps.
//!
//! The [`client::HubClient`] keeps one WebSocket connection to a presence
//! hub, maintains a local read-through cache of remote presence, and
//! auto-demotes the local user after inactivity. The [`reconcile`] module
//! turns presence and receipt signals into per-message delivered/read
//! status, and [`typing`] manages the ephemeral typing indicator.

pub mod cache;
pub mod client;
pub mod config;
pub mod idle;
pub mod reconcile;
pub mod status;
pub mod typing;
