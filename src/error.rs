use crate::stats::Violation;
use std::time::Duration;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid collection name: {0}")]
    InvalidName(String),
    #[error("Client is not connected")]
    Disconnected,
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad input: {0}")]
    BadInput(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Injected fault: {0}")]
    Injected(String),
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("Failed to provision checker collection: {0}")]
    Provision(ClientError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Invalid config: {0}")]
    Config(String),
    #[error("{} expectation(s) not met: {}", .0.len(), format_violations(.0))]
    Expectations(Vec<Violation>),
    #[error("Case '{case}' failed: {reason}")]
    Case { case: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
