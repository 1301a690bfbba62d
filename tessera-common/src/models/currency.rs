use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt,
    hash::{Hash, Hasher},
};

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::{Address, CurrencyHash, Key, Value};
use crate::{serde_primitives::bigint_string_option, Bytes};

/// A fungible asset kind.
///
/// Identity is the [`CurrencyHash`]: a SHA-1 digest of the canonical encoding of every other
/// field, so two currencies with the same ticker but different minters are different assets.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "CurrencyData", into = "CurrencyData")]
pub struct Currency {
    pub ticker: String,
    pub decimal_places: u8,
    /// Addresses allowed to mint and burn. `None` means anyone may.
    pub minters: Option<BTreeSet<Address>>,
    pub maximum_supply: Option<BigInt>,
    /// Legacy currencies predate supply tracking and cannot answer total supply queries.
    pub total_supply_trackable: bool,
    hash: CurrencyHash,
}

impl Currency {
    /// A currency created before total supply tracking existed.
    pub fn legacy(ticker: &str, decimal_places: u8, minters: Option<BTreeSet<Address>>) -> Self {
        Self::build(ticker.to_string(), decimal_places, minters, None, false)
    }

    pub fn uncapped(ticker: &str, decimal_places: u8, minters: Option<BTreeSet<Address>>) -> Self {
        Self::build(ticker.to_string(), decimal_places, minters, None, true)
    }

    pub fn capped(
        ticker: &str,
        decimal_places: u8,
        maximum_supply: BigInt,
        minters: Option<BTreeSet<Address>>,
    ) -> Self {
        Self::build(ticker.to_string(), decimal_places, minters, Some(maximum_supply), true)
    }

    fn build(
        ticker: String,
        decimal_places: u8,
        minters: Option<BTreeSet<Address>>,
        maximum_supply: Option<BigInt>,
        total_supply_trackable: bool,
    ) -> Self {
        let mut currency = Self {
            ticker,
            decimal_places,
            minters,
            maximum_supply,
            total_supply_trackable,
            hash: CurrencyHash::default(),
        };
        currency.hash = CurrencyHash::new(Sha1::digest(currency.to_value().encode()).into());
        currency
    }

    pub fn hash(&self) -> &CurrencyHash {
        &self.hash
    }

    pub fn allows_to_mint(&self, address: &Address) -> bool {
        self.minters
            .as_ref()
            .map_or(true, |minters| minters.contains(address))
    }

    /// Encoded form the hash is derived from.
    pub fn to_value(&self) -> Value {
        let minters = match &self.minters {
            Some(minters) => Value::List(
                minters
                    .iter()
                    .map(|m| Value::Binary(Bytes::from(m.to_vec())))
                    .collect(),
            ),
            None => Value::Null,
        };
        let mut entries = vec![
            (Key::from("ticker"), Value::from(self.ticker.as_str())),
            (Key::from("decimalPlaces"), Value::Binary(Bytes::from([self.decimal_places]))),
            (Key::from("minters"), minters),
        ];
        if let Some(max) = &self.maximum_supply {
            entries.push((Key::from("maximumSupply"), Value::Integer(max.clone())));
        }
        if self.total_supply_trackable {
            entries.push((Key::from("totalSupplyTrackable"), Value::Boolean(true)));
        }
        entries.into_iter().collect()
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Currency {}

impl PartialOrd for Currency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Currency {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({} ({}))", self.ticker, self.hash)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ticker, self.hash)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencyData {
    ticker: String,
    decimal_places: u8,
    minters: Option<BTreeSet<Address>>,
    #[serde(with = "bigint_string_option", default)]
    maximum_supply: Option<BigInt>,
    total_supply_trackable: bool,
}

impl From<CurrencyData> for Currency {
    fn from(data: CurrencyData) -> Self {
        Currency::build(
            data.ticker,
            data.decimal_places,
            data.minters,
            data.maximum_supply,
            data.total_supply_trackable,
        )
    }
}

impl From<Currency> for CurrencyData {
    fn from(currency: Currency) -> Self {
        Self {
            ticker: currency.ticker,
            decimal_places: currency.decimal_places,
            minters: currency.minters,
            maximum_supply: currency.maximum_supply,
            total_supply_trackable: currency.total_supply_trackable,
        }
    }
}

/// An amount of a [`Currency`], kept in its smallest unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FungibleAssetValue {
    pub currency: Currency,
    #[serde(with = "crate::serde_primitives::bigint_string")]
    pub raw_value: BigInt,
}

impl FungibleAssetValue {
    pub fn zero(currency: Currency) -> Self {
        Self { currency, raw_value: BigInt::zero() }
    }

    pub fn from_raw_value(currency: Currency, raw_value: BigInt) -> Self {
        Self { currency, raw_value }
    }

    pub fn is_zero(&self) -> bool {
        self.raw_value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.raw_value.is_positive()
    }

    /// Returns `None` if the currencies differ.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        (self.currency == other.currency).then(|| {
            Self::from_raw_value(self.currency.clone(), &self.raw_value + &other.raw_value)
        })
    }

    /// Returns `None` if the currencies differ.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        (self.currency == other.currency).then(|| {
            Self::from_raw_value(self.currency.clone(), &self.raw_value - &other.raw_value)
        })
    }
}

impl fmt::Display for FungibleAssetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.raw_value.is_negative() { "-" } else { "" };
        let digits = self.raw_value.abs().to_string();
        let places = self.currency.decimal_places as usize;
        if places == 0 {
            return write!(f, "{sign}{digits} {}", self.currency.ticker);
        }
        let padded = format!("{digits:0>width$}", width = places + 1);
        let (major, minor) = padded.split_at(padded.len() - places);
        write!(f, "{sign}{major}.{minor} {}", self.currency.ticker)
    }
}
