//! Evaluation service and replay tooling for Tessera blocks.
use thiserror::Error;

pub mod cli;
pub mod config;
pub mod replay;
pub mod services;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Setup error: {0}")]
    Setup(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error(transparent)]
    Evaluation(#[from] tessera_common::action::EvaluationError),
}
