//! Error types for StarkScript

use crate::codec::{ClassError, FeltError};
use crate::types::{ClassHash, ContractAddress, TransactionHash, TransactionOutcome};

use std::time::Duration;
use thiserror::Error;

/// Why the node refused to admit a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("class already declared")]
    ClassAlreadyDeclared,

    #[error("invalid transaction nonce")]
    InvalidNonce,

    #[error("max fee is smaller than the minimal transaction cost")]
    InsufficientMaxFee,

    #[error("account balance is smaller than the transaction's max fee")]
    InsufficientAccountBalance,

    #[error("account validation failed: {0}")]
    ValidationFailure(String),

    #[error("class compilation failed")]
    CompilationFailed,

    #[error("transaction already exists in the pool")]
    DuplicateTransaction,

    #[error("compiled class hash does not match the declared class")]
    CompiledClassHashMismatch,

    #[error("transaction version is not supported")]
    UnsupportedTransactionVersion,

    #[error("unexpected node error: {0}")]
    Unexpected(String),

    /// Status reported as REJECTED after admission
    #[error("{0}")]
    Status(String),
}

impl Rejection {
    /// Map a node error code to a rejection, if it is one
    pub fn from_code(code: i64, message: &str, data: Option<&str>) -> Option<Self> {
        let detail = data.unwrap_or(message).to_string();
        let rejection = match code {
            51 => Rejection::ClassAlreadyDeclared,
            52 => Rejection::InvalidNonce,
            53 => Rejection::InsufficientMaxFee,
            54 => Rejection::InsufficientAccountBalance,
            55 => Rejection::ValidationFailure(detail),
            56 => Rejection::CompilationFailed,
            59 => Rejection::DuplicateTransaction,
            60 => Rejection::CompiledClassHashMismatch,
            61 => Rejection::UnsupportedTransactionVersion,
            63 => Rejection::Unexpected(detail),
            _ => return None,
        };
        Some(rejection)
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::ClassAlreadyDeclared => "class_already_declared",
            Rejection::InvalidNonce => "invalid_nonce",
            Rejection::InsufficientMaxFee => "insufficient_max_fee",
            Rejection::InsufficientAccountBalance => "insufficient_balance",
            Rejection::ValidationFailure(_) => "validation_failure",
            Rejection::CompilationFailed => "compilation_failed",
            Rejection::DuplicateTransaction => "duplicate",
            Rejection::CompiledClassHashMismatch => "compiled_class_hash_mismatch",
            Rejection::UnsupportedTransactionVersion => "unsupported_version",
            Rejection::Unexpected(_) => "unexpected",
            Rejection::Status(_) => "status",
        }
    }
}

/// Main error type for script operations
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No account configured for a state-changing operation")]
    MissingAccount,

    #[error("Compilation error: {0}")]
    Compilation(#[from] ClassError),

    #[error("Argument encoding error: {0}")]
    ArgumentEncoding(#[from] FeltError),

    #[error("Class {class_hash} is not declared")]
    ClassNotDeclared { class_hash: ClassHash },

    #[error("Constructor expects {expected} calldata values, got {actual}")]
    ConstructorArity { expected: usize, actual: usize },

    #[error("Entrypoint '{entrypoint}' not found in contract {contract}")]
    EntrypointNotFound {
        contract: ContractAddress,
        entrypoint: String,
    },

    #[error("Contract {0} not found")]
    ContractNotFound(ContractAddress),

    #[error("Max fee {max_fee} is below the estimated fee {estimated}")]
    FeeTooLow { max_fee: u128, estimated: u128 },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Nonce error for account {account}: {message}")]
    Nonce {
        account: ContractAddress,
        message: String,
    },

    #[error("Network error during {operation}: {message}")]
    Network { operation: String, message: String },

    #[error("Transaction rejected: {reason}")]
    Rejected {
        transaction_hash: Option<TransactionHash>,
        reason: Rejection,
    },

    #[error("Transaction {transaction_hash} reverted: {reason}")]
    Reverted {
        transaction_hash: TransactionHash,
        reason: String,
    },

    #[error("Execution reverted: {reason}")]
    ExecutionReverted { reason: String },

    #[error("Timed out after {waited:?} waiting for {transaction_hash} (last status: {last_observed})")]
    TimedOut {
        transaction_hash: TransactionHash,
        waited: Duration,
        last_observed: TransactionOutcome,
    },

    #[error("Node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScriptError {
    /// Check if the error comes from a transient condition
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScriptError::Network { .. })
    }

    /// Check if the error was detected before anything was sent to the node
    pub fn is_build_time(&self) -> bool {
        matches!(
            self,
            ScriptError::Config(_)
                | ScriptError::MissingAccount
                | ScriptError::Compilation(_)
                | ScriptError::ArgumentEncoding(_)
                | ScriptError::ClassNotDeclared { .. }
                | ScriptError::ConstructorArity { .. }
                | ScriptError::EntrypointNotFound { .. }
                | ScriptError::ContractNotFound(_)
                | ScriptError::FeeTooLow { .. }
                | ScriptError::Signing(_)
        )
    }

    /// Whether the account's cached nonce can no longer be trusted
    pub(crate) fn invalidates_nonce(&self) -> bool {
        matches!(
            self,
            ScriptError::Rejected {
                reason: Rejection::InvalidNonce,
                ..
            }
        )
    }
}

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;
