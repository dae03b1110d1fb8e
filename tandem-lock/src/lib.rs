//! Per-key lock registry for Tandem.
//!
//! Serializes conflicting updates to the same logical aggregate (a user's
//! goals, a buddy pairing) across request threads:
//!
//! - critical sections under the same key are mutually exclusive
//! - a thread already holding a key re-enters without blocking itself
//! - different keys never block one another
//!
//! There is no fairness among waiters. [`LockRegistry::acquire`] waits
//! indefinitely; [`LockRegistry::acquire_timeout`] bounds the wait.

mod error;
mod registry;

pub use error::{LockError, LockResult};
pub use registry::{LockGuard, LockRegistry};
