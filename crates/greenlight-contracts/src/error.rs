use thiserror::Error;

/// Result type for contract-model operations.
pub type ContractResult<T> = Result<T, ContractError>;

/// Contract-model errors. All non-retriable: callers translate them into
/// a terminal status plus an audit event, never a silent retry.
#[derive(Debug, Error)]
pub enum ContractError {
    /// An upstream reference is missing, unapproved, or carries no hash.
    #[error("context isolation: {0}")]
    ContextIsolation(String),

    /// A declared upstream hash does not match the approved artifact.
    #[error("hash chain broken at {kind}: declared {declared}, found {actual}")]
    HashChainBroken {
        kind: String,
        declared: String,
        actual: String,
    },

    /// Mutating or re-approving an approved contract.
    #[error("immutability violation: {0}")]
    Immutability(String),

    /// Structurally invalid payload caught at the draft boundary.
    #[error("contract validation failed: {0}")]
    Validation(String),

    /// Operation not allowed from the contract's current status.
    #[error("cannot {op} a {status} contract")]
    InvalidStatus { op: String, status: String },
}
