pub mod block;
pub mod currency;
pub mod validator;
pub mod value;

use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub use self::{
    block::{PreEvaluationBlock, PreEvaluationBlockHeader, Transaction},
    currency::{Currency, FungibleAssetValue},
    validator::{Validator, ValidatorSet},
    value::{Key, Value},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHashError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Declares a fixed size, hex (de)serialized byte array newtype.
macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $size:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $size]);

        impl $name {
            pub const SIZE: usize = $size;

            pub const fn new(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, ParseHashError> {
                let array: [u8; $size] = bytes.try_into().map_err(|_| {
                    ParseHashError::InvalidLength { expected: $size, actual: bytes.len() }
                })?;
                Ok(Self(array))
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self([0u8; $size])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $size]> for $name {
            fn from(bytes: [u8; $size]) -> Self {
                Self(bytes)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = ParseHashError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s).map_err(|e| ParseHashError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// Identifies an account (and, for world states, an account namespace).
    Address,
    20
);

fixed_bytes!(
    /// A SHA-256 digest. Used for state roots and pre-evaluation hashes.
    HashDigest,
    32
);

fixed_bytes!(
    /// Identifies a committed block.
    BlockHash,
    32
);

fixed_bytes!(
    /// Identifies a transaction.
    TxId,
    32
);

fixed_bytes!(
    /// SHA-1 digest of a currency's encoded form.
    CurrencyHash,
    20
);

/// Root hash of an account (or world) trie.
pub type StateRootHash = HashDigest;

/// Content hash of a block computed before its state root is known.
pub type PreEvaluationHash = HashDigest;

/// Addresses reserved by the protocol.
pub struct ReservedAddresses;

impl ReservedAddresses {
    /// The account under which legacy (flat namespace) states live.
    pub const LEGACY_ACCOUNT: Address = Address([
        0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    ]);
}
