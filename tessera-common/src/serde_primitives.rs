//! Serde helpers shared by models and DTOs.

/// Serialize a byte buffer as a `0x` prefixed hex string.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(x: T, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        s.serialize_str(&format!("0x{}", hex::encode(x.as_ref())))
    }

    pub fn deserialize<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: From<Vec<u8>>,
    {
        let value = String::deserialize(d)?;
        let stripped = value
            .strip_prefix("0x")
            .unwrap_or(&value);
        hex::decode(stripped)
            .map(Into::into)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// Serialize a big integer as its decimal string representation.
///
/// JSON numbers lose precision beyond 2^53, balances and supplies routinely exceed that.
pub mod bigint_string {
    use std::str::FromStr;

    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(x: &BigInt, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&x.to_string())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<BigInt, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(d)?;
        BigInt::from_str(&value).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// Same as [`bigint_string`] for optional values.
pub mod bigint_string_option {
    use std::str::FromStr;

    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(x: &Option<BigInt>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match x {
            Some(value) => s.serialize_some(&value.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<BigInt>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(d)?
            .map(|value| {
                BigInt::from_str(&value).map_err(|e| serde::de::Error::custom(e.to_string()))
            })
            .transpose()
    }
}
