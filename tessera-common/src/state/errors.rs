use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    codec::CodecError,
    models::{Address, BlockHash, Currency, FungibleAssetValue, HashDigest},
};

/// Errors raised while reading or updating account state.
///
/// Serializable so that a failure inside a remotely evaluated action can travel back to the
/// caller as part of its evaluation record.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateError {
    #[error(
        "The total supply value of the currency {0} is not trackable because it is a legacy \
         untracked currency which might have been established before the introduction of \
         total supply tracking support."
    )]
    TotalSupplyNotTrackable(Currency),
    #[error("Unknown block: {0}")]
    UnknownBlock(BlockHash),
    #[error("Unknown state root: {0}")]
    UnknownStateRoot(HashDigest),
    #[error("State getters of a deserialized delta are not bound to any state")]
    DetachedGetter,
    #[error("Failed to decode stored value: {0}")]
    Codec(#[from] CodecError),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Insufficient balance: {address} holds {balance}, needs {required}")]
    InsufficientBalance {
        address: Address,
        balance: FungibleAssetValue,
        required: FungibleAssetValue,
    },
    #[error("Invalid amount: {0}")]
    InvalidAmount(FungibleAssetValue),
    #[error("Address {minter} is not allowed to mint or burn {currency}")]
    CurrencyPermission { minter: Address, currency: Currency },
    #[error("Minting {amount} exceeds the maximum supply of {currency}")]
    SupplyOverflow { currency: Currency, amount: FungibleAssetValue },
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl StateError {
    /// Errors caused by the node's own storage rather than by what an action did. The same
    /// action may succeed on another node, so they must never be recorded as its outcome.
    pub fn is_host_failure(&self) -> bool {
        matches!(
            self,
            StateError::UnknownBlock(_) |
                StateError::UnknownStateRoot(_) |
                StateError::DetachedGetter |
                StateError::Codec(_) |
                StateError::Storage(_) |
                StateError::Unexpected(_)
        )
    }
}
