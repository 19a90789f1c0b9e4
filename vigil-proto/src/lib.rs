//! Shared protocol definitions for the Vigil presence wire format.

pub mod presence;
pub mod signal;
pub mod wire;
