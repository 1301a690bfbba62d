//! Client side of the remote evaluation protocol.
//!
//! [`HttpEvaluationClient`] moves blocks and serialized records over HTTP, while
//! [`RemoteActionEvaluator`] turns the records it receives back into a chain of evaluations
//! that can be queried like locally produced ones.
pub mod chain;
pub mod cli;
pub mod config;
pub mod rpc;

pub use chain::RemoteActionEvaluator;
pub use config::RetryConfiguration;
pub use rpc::{HttpEvaluationClient, HttpEvaluationClientOptions, RPCError};

/// Path prefix of every endpoint of the evaluation service.
pub const EVALUATION_API_VERSION: &str = "v1";
