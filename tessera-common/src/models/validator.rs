use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use serde::{Deserialize, Serialize};

use super::{Key, Value};
use crate::{codec::CodecError, serde_primitives::bigint_string, Bytes};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Validator {
    pub public_key: Bytes,
    #[serde(with = "bigint_string")]
    pub power: BigInt,
}

impl Validator {
    pub fn new(public_key: Bytes, power: BigInt) -> Self {
        Self { public_key, power }
    }

    pub fn to_value(&self) -> Value {
        [
            (Key::from("publicKey"), Value::Binary(self.public_key.clone())),
            (Key::from("power"), Value::Integer(self.power.clone())),
        ]
        .into_iter()
        .collect()
    }

    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let dict = value
            .as_dictionary()
            .ok_or_else(|| CodecError::UnexpectedShape("validator must be a dictionary".into()))?;
        let public_key = dict
            .get(&Key::from("publicKey"))
            .and_then(Value::as_binary)
            .ok_or_else(|| CodecError::UnexpectedShape("missing validator public key".into()))?;
        let power = dict
            .get(&Key::from("power"))
            .and_then(Value::as_integer)
            .ok_or_else(|| CodecError::UnexpectedShape("missing validator power".into()))?;
        Ok(Self::new(public_key.clone(), power.clone()))
    }
}

/// Validators ordered by public key. Public keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn new(mut validators: Vec<Validator>) -> Self {
        validators.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        validators.dedup_by(|a, b| a.public_key == b.public_key);
        Self { validators }
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn get(&self, public_key: &[u8]) -> Option<&Validator> {
        self.validators
            .iter()
            .find(|v| v.public_key.as_ref() == public_key)
    }

    pub fn total_power(&self) -> BigInt {
        self.validators
            .iter()
            .map(|v| &v.power)
            .sum()
    }

    /// Returns a copy with `validator` inserted or replaced. Non-positive power removes it.
    pub fn update(&self, validator: Validator) -> Self {
        let mut validators: Vec<Validator> = self
            .validators
            .iter()
            .filter(|v| v.public_key != validator.public_key)
            .cloned()
            .collect();
        if !(validator.power.is_zero() || validator.power.is_negative()) {
            validators.push(validator);
        }
        Self::new(validators)
    }

    pub fn to_value(&self) -> Value {
        Value::List(
            self.validators
                .iter()
                .map(Validator::to_value)
                .collect(),
        )
    }

    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        let items = value
            .as_list()
            .ok_or_else(|| CodecError::UnexpectedShape("validator set must be a list".into()))?;
        let validators = items
            .iter()
            .map(Validator::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(validators))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn validator(key: u8, power: i64) -> Validator {
        Validator::new(Bytes::from([key; 33]), power.into())
    }

    #[test]
    fn test_update_keeps_order_and_removes_zero_power() {
        let set = ValidatorSet::default()
            .update(validator(3, 10))
            .update(validator(1, 5))
            .update(validator(2, 7));
        assert_eq!(set.validators(), &[validator(1, 5), validator(2, 7), validator(3, 10)]);
        assert_eq!(set.total_power(), BigInt::from(22));

        let set = set
            .update(validator(2, 0))
            .update(validator(1, 9));
        assert_eq!(set.validators(), &[validator(1, 9), validator(3, 10)]);
    }

    #[test]
    fn test_value_conversion() {
        let set = ValidatorSet::new(vec![validator(2, 1), validator(1, 2)]);
        assert_eq!(ValidatorSet::from_value(&set.to_value()).unwrap(), set);
    }
}
