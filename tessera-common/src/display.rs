use std::fmt::{Display, Formatter};

use tracing::Value;

/// Wrapper that makes `Option<T>` implement `Display`.
pub struct DisplayOption<'a, T>(&'a Option<T>);

impl<'a, T: Display> Display for DisplayOption<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(inner) => write!(f, "{inner}"),
            None => write!(f, "none"),
        }
    }
}

/// Convenience function so you can write `tx_id = opt(&tx_id)` in `tracing` logs.
pub fn opt<T: Display>(val: &Option<T>) -> impl Value + '_ {
    tracing::field::display(DisplayOption(val))
}

/// Displays the first and last four bytes of a hash, e.g. `0a1b2c3d..f0e1d2c3`.
pub struct ShortHex<'a>(&'a [u8]);

impl<'a> Display for ShortHex<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.len() <= 8 {
            return write!(f, "{}", hex::encode(self.0));
        }
        let (head, tail) = (&self.0[..4], &self.0[self.0.len() - 4..]);
        write!(f, "{}..{}", hex::encode(head), hex::encode(tail))
    }
}

/// Shortened hash for log fields.
pub fn short(bytes: &impl AsRef<[u8]>) -> impl Value + '_ {
    tracing::field::display(ShortHex(bytes.as_ref()))
}
