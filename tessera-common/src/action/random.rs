//! Deterministic randomness for action execution.
//!
//! Every node replaying a block must observe exactly the same random draws, so both the seed
//! derivation and the generator are fixed algorithms rather than anything from the host.
//! The generator is Knuth's subtractive generator with the constants and quirks of the
//! widely deployed .NET `System.Random`, which keeps draws identical to existing chains.
use sha1::{Digest, Sha1};

const MBIG: i32 = i32::MAX;
const MSEED: i32 = 161_803_398;

/// SHA-1 of a transaction signature, the digest mixed into action seeds.
pub fn hash_signature(signature: &[u8]) -> [u8; 20] {
    Sha1::digest(signature).into()
}

/// Derives the seed of the action at `action_offset` within a transaction.
///
/// `(le_i32(pre_evaluation_hash) ^ le_i32(hashed_signature)) + action_offset` with wrapping
/// arithmetic. An empty pre-evaluation hash or an empty signature contributes zero.
pub fn generate_random_seed(
    pre_evaluation_hash: &[u8],
    hashed_signature: &[u8],
    signature: &[u8],
    action_offset: i32,
) -> i32 {
    let hash_seed = if pre_evaluation_hash.is_empty() { 0 } else { le_i32(pre_evaluation_hash) };
    let signature_seed = if signature.is_empty() { 0 } else { le_i32(hashed_signature) };
    (hash_seed ^ signature_seed).wrapping_add(action_offset)
}

/// Reads the first four bytes as a little endian `i32`, zero padding shorter input.
fn le_i32(bytes: &[u8]) -> i32 {
    let mut buf = [0u8; 4];
    let len = bytes.len().min(4);
    buf[..len].copy_from_slice(&bytes[..len]);
    i32::from_le_bytes(buf)
}

/// Seeded subtractive pseudo random generator.
///
/// Two generators built from the same seed produce the same sequence on every platform.
#[derive(Clone, Debug)]
pub struct DeterministicRandom {
    seed: i32,
    inext: usize,
    inextp: usize,
    seed_array: [i32; 56],
}

impl DeterministicRandom {
    pub fn new(seed: i32) -> Self {
        let mut seed_array = [0i32; 56];
        let subtraction = if seed == i32::MIN { i32::MAX } else { seed.abs() };
        let mut mj = MSEED.wrapping_sub(subtraction);
        seed_array[55] = mj;
        let mut mk: i32 = 1;
        for i in 1..55 {
            let ii = (21 * i) % 55;
            seed_array[ii] = mk;
            mk = mj.wrapping_sub(mk);
            if mk < 0 {
                mk = mk.wrapping_add(MBIG);
            }
            mj = seed_array[ii];
        }
        for _ in 1..5 {
            for i in 1..56 {
                seed_array[i] = seed_array[i].wrapping_sub(seed_array[1 + (i + 30) % 55]);
                if seed_array[i] < 0 {
                    seed_array[i] = seed_array[i].wrapping_add(MBIG);
                }
            }
        }
        Self { seed, inext: 0, inextp: 21, seed_array }
    }

    /// The seed this generator was built from.
    pub fn seed(&self) -> i32 {
        self.seed
    }

    fn internal_sample(&mut self) -> i32 {
        let mut inext = self.inext + 1;
        if inext >= 56 {
            inext = 1;
        }
        let mut inextp = self.inextp + 1;
        if inextp >= 56 {
            inextp = 1;
        }

        let mut value = self.seed_array[inext].wrapping_sub(self.seed_array[inextp]);
        if value == MBIG {
            value -= 1;
        }
        if value < 0 {
            value = value.wrapping_add(MBIG);
        }

        self.seed_array[inext] = value;
        self.inext = inext;
        self.inextp = inextp;
        value
    }

    fn sample(&mut self) -> f64 {
        self.internal_sample() as f64 * (1.0 / MBIG as f64)
    }

    fn sample_for_large_range(&mut self) -> f64 {
        let mut result = self.internal_sample();
        if self.internal_sample() % 2 == 0 {
            result = -result;
        }
        (result as f64 + (i32::MAX - 1) as f64) / (2.0 * i32::MAX as f64 - 1.0)
    }

    /// A non-negative value below `i32::MAX`.
    pub fn next(&mut self) -> i32 {
        self.internal_sample()
    }

    /// A value in `[0, max)`. Non-positive bounds yield zero but still consume a draw.
    pub fn next_max(&mut self, max: i32) -> i32 {
        (self.sample() * max.max(0) as f64) as i32
    }

    /// A value in `[min, max)`. Returns `min` (consuming a draw) when `max <= min`.
    pub fn next_range(&mut self, min: i32, max: i32) -> i32 {
        let range = (max as i64 - min as i64).max(0);
        if range <= i32::MAX as i64 {
            (self.sample() * range as f64) as i32 + min
        } else {
            ((self.sample_for_large_range() * range as f64) as i64 + min as i64) as i32
        }
    }

    /// A value in `[0.0, 1.0)`.
    pub fn next_double(&mut self) -> f64 {
        self.sample()
    }

    pub fn next_bytes(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = (self.internal_sample() % 256) as u8;
        }
    }
}
