//! Error type shared by the build and deployment helpers

use std::path::PathBuf;

use miden_client::ClientError;

pub type Result<T> = std::result::Result<T, DeployError>;

/// Everything that can go wrong between compiling a contract and seeing its account committed.
#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("failed to build contract at {dir}: {reason}")]
    Build { dir: PathBuf, reason: String },

    #[error("invalid contract package: {0}")]
    InvalidPackage(String),

    #[error("failed to build account: {0}")]
    Account(String),

    #[error("failed to build note: {0}")]
    Note(String),

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("failed to build transaction request: {0}")]
    TransactionRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("transaction {tx_id} was discarded: {reason}")]
    Discarded { tx_id: String, reason: String },

    #[error("transaction {tx_id} not committed after {attempts} polls")]
    CommitTimeout { tx_id: String, attempts: u32 },

    #[error("transaction {0} is not tracked by the client")]
    UntrackedTransaction(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
