//! error types for the pool state machine

use thiserror::Error;

use crate::commitment::TreeError;
use crate::config::ConfigError;
use crate::ledger::{AccountId, LedgerError};
use crate::note::NoteError;
use crate::nullifier::Nullifier;
use crate::value::Amount;

pub type Result<T> = std::result::Result<T, PoolError>;

/// why a transaction was rejected. a rejected transaction never mutates
/// pool state or balances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("invalid transaction proof")]
    InvalidProof,

    #[error("merkle root is not one of the known roots")]
    StaleRoot,

    #[error("input is already spent: {0:?}")]
    DoubleSpend(Nullifier),

    #[error("commitment tree is full")]
    TreeFull,

    #[error("ext amount {ext_amount} does not match bridged amount {amount}")]
    ExactAmountMismatch { ext_amount: i128, amount: Amount },

    #[error("insufficient pool balance: available {available}, required {required}")]
    InsufficientPoolBalance { available: Amount, required: Amount },

    #[error("bridged funds not received: unaccounted {available}, required {required}")]
    InsufficientBridgedFunds { available: Amount, required: Amount },

    #[error("caller {0} is not authorized")]
    UnauthorizedCaller(AccountId),

    #[error("token {0} is not supported")]
    UnsupportedToken(AccountId),

    #[error("note has no leaf index")]
    UnboundNote,

    #[error("note keypair has no private key")]
    MissingPrivateKey,

    #[error("deposit {amount} exceeds limit {limit}")]
    DepositLimitExceeded { amount: Amount, limit: Amount },

    #[error("withdrawal {amount} below minimum {minimum}")]
    WithdrawalBelowMinimum { amount: Amount, minimum: Amount },

    #[error("withdrawal has no recipient")]
    MissingRecipient,

    #[error("invalid fee")]
    InvalidFee,

    #[error("invalid ext amount")]
    InvalidExtAmount,

    #[error("ext data hash does not match the proof")]
    ExtDataHashMismatch,

    #[error("public amount does not match ext amount and fee")]
    PublicAmountMismatch,

    #[error("unsupported number of inputs: {0}")]
    InvalidArity(usize),

    #[error("malformed transaction payload: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<TreeError> for PoolError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::TreeFull { .. } => PoolError::TreeFull,
            TreeError::InvalidHeight(h) => PoolError::Config(ConfigError::InvalidTreeHeight(h)),
            TreeError::InvalidHistorySize => PoolError::Config(ConfigError::InvalidRootHistorySize),
        }
    }
}

impl From<NoteError> for PoolError {
    fn from(err: NoteError) -> Self {
        match err {
            NoteError::UnboundNote => PoolError::UnboundNote,
            NoteError::MissingPrivateKey => PoolError::MissingPrivateKey,
        }
    }
}
