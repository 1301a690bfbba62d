//! Shared models, traits and helpers used within the Tessera system.
//!
//! The crate hosts everything both sides of the evaluation protocol need to agree on: the
//! state view contracts, the state delta with its rebindable getters, the action trait and
//! its execution context, the deterministic seed derivation and the sequential evaluator
//! itself, plus the wire DTOs exchanged with a remote evaluation service.
pub mod action;
pub mod codec;
pub mod display;
pub mod dto;
pub mod hex_bytes;
pub mod models;
pub mod serde_primitives;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use hex_bytes::Bytes;
