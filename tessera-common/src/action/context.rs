//! Execution context handed to actions.
//!
//! A context bundles who signed the action, where in the chain it runs, the state it reads
//! from and a seeded random source. The random source is the only stateful part: every draw
//! advances it. [`ActionContext::get_unconsumed_context`] therefore rebuilds the generator
//! from the seed instead of copying the live one.

use parking_lot::{Mutex, MutexGuard};

use super::random::DeterministicRandom;
use crate::{
    models::{Address, TxId},
    state::AccountStateDelta,
};

/// Runtime context for action execution.
pub struct ActionContext {
    pub signer: Address,
    /// `None` for block actions that run outside of any transaction.
    pub tx_id: Option<TxId>,
    pub miner: Address,
    pub block_index: i64,
    pub block_protocol_version: i32,
    /// Set when the action is evaluated speculatively. Carried through unchanged.
    pub rehearsal: bool,
    /// State before this action runs.
    pub previous_state: AccountStateDelta,
    random_seed: i32,
    random: Mutex<DeterministicRandom>,
}

impl ActionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signer: Address,
        tx_id: Option<TxId>,
        miner: Address,
        block_index: i64,
        block_protocol_version: i32,
        rehearsal: bool,
        previous_state: AccountStateDelta,
        random_seed: i32,
    ) -> Self {
        Self {
            signer,
            tx_id,
            miner,
            block_index,
            block_protocol_version,
            rehearsal,
            previous_state,
            random_seed,
            random: Mutex::new(DeterministicRandom::new(random_seed)),
        }
    }

    pub fn random_seed(&self) -> i32 {
        self.random_seed
    }

    /// The shared random source. Draws advance it for every later caller.
    pub fn random(&self) -> MutexGuard<'_, DeterministicRandom> {
        self.random.lock()
    }

    /// A fresh generator seeded like this context's, unaffected by earlier draws.
    pub fn get_random(&self) -> DeterministicRandom {
        DeterministicRandom::new(self.random_seed)
    }

    /// An identical context whose random source starts over from the seed.
    pub fn get_unconsumed_context(&self) -> Self {
        Self::new(
            self.signer,
            self.tx_id,
            self.miner,
            self.block_index,
            self.block_protocol_version,
            self.rehearsal,
            self.previous_state.clone(),
            self.random_seed,
        )
    }

    /// Whether the action runs as part of the block itself rather than a transaction.
    pub fn block_action(&self) -> bool {
        self.tx_id.is_none()
    }

    /// Gas is not metered; kept so actions can be written against a stable interface.
    pub fn use_gas(&self, _gas: i64) {}

    pub fn gas_used(&self) -> i64 {
        0
    }

    pub fn gas_limit(&self) -> i64 {
        0
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("signer", &self.signer)
            .field("tx_id", &self.tx_id)
            .field("miner", &self.miner)
            .field("block_index", &self.block_index)
            .field("block_protocol_version", &self.block_protocol_version)
            .field("rehearsal", &self.rehearsal)
            .field("random_seed", &self.random_seed)
            .field("previous_state", &self.previous_state)
            .finish()
    }
}
