//! Trait abstractions at the seams of the connector layer
//!
//! The native store client and the passage of time are both reached through
//! traits so the pool, monitor and router can be exercised against the
//! simulated backend and a deterministic clock.

pub mod store;
pub mod time;

pub use store::*;
pub use time::*;
