//! Local re-evaluation of recorded blocks.
use std::{path::Path, sync::Arc, time::Instant};

use tessera_common::{
    action::{ActionEvaluation, ActionEvaluator},
    models::PreEvaluationBlock,
    state::BlockChainStates,
};
use tessera_storage::{CacheConfig, LocalCacheBlockChainStates};
use tracing::{info, instrument, warn};

use crate::ServiceError;

pub fn read_block(path: &Path) -> Result<PreEvaluationBlock, ServiceError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ServiceError::Setup(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| ServiceError::Setup(format!("Invalid pre-evaluation block: {e}")))
}

/// Evaluates `block` in process, reading committed state through the cache at `cache` when
/// one is given.
#[instrument(skip_all, fields(block_index = block.index()))]
pub fn replay(
    states: Arc<dyn BlockChainStates>,
    block: &PreEvaluationBlock,
    cache: Option<&CacheConfig>,
) -> Result<Vec<ActionEvaluation>, ServiceError> {
    let states: Arc<dyn BlockChainStates> = match cache {
        Some(config) => Arc::new(
            LocalCacheBlockChainStates::open(states, config)
                .map_err(|e| ServiceError::Setup(e.to_string()))?,
        ),
        None => states,
    };

    let started = Instant::now();
    let evaluations = ActionEvaluator::new(states).evaluate_block(block)?;
    for (i, evaluation) in evaluations.iter().enumerate() {
        let context = &evaluation.input_context;
        match &evaluation.exception {
            Some(exception) => warn!(
                i,
                tx_id = ?context.tx_id,
                random_seed = context.random_seed(),
                error = %exception,
                "Action failed"
            ),
            None => info!(
                i,
                tx_id = ?context.tx_id,
                random_seed = context.random_seed(),
                updated = evaluation.output_state.updated_addresses().len(),
                "Action evaluated"
            ),
        }
    }
    info!(
        evaluations = evaluations.len(),
        duration_ms = started.elapsed().as_millis(),
        "Replayed block"
    );
    Ok(evaluations)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tessera_common::{
        action::EvaluationError,
        dto::RemoteEvaluationResponse,
        models::{BlockHash, Value},
        state::{AccountGetters, AccountStateDelta, StateError},
        testing::*,
    };
    use tessera_storage::MemoryBlockChainStates;

    use super::*;

    const PREVIOUS: BlockHash = BlockHash::new([0x42; 32]);

    fn states() -> Arc<dyn BlockChainStates> {
        let states = MemoryBlockChainStates::new();
        states
            .commit(
                PREVIOUS,
                None,
                &AccountStateDelta::new(AccountGetters::null())
                    .set_state(address(0xc0), Value::from(1)),
            )
            .unwrap();
        Arc::new(states)
    }

    #[test_log::test]
    fn test_replay_is_deterministic_with_and_without_cache() {
        let dir = TempDir::new().unwrap();
        let cache = CacheConfig { path: dir.path().to_path_buf() };
        let block = block_after(
            PREVIOUS,
            vec![
                transaction(1, vec![increment(0xc0), draw(0xd0)]),
                transaction(2, vec![fail("stop"), increment(0xc0)]),
            ],
        );
        let serialize = |evaluations: &[ActionEvaluation]| {
            serde_json::to_value(RemoteEvaluationResponse::from(evaluations)).unwrap()
        };

        let uncached = replay(states(), &block, None).unwrap();
        // records keep the cache open through their getters
        let cold = serialize(&replay(states(), &block, Some(&cache)).unwrap()[..]);
        let warm = replay(states(), &block, Some(&cache)).unwrap();

        assert_eq!(uncached.len(), 3);
        assert_eq!(cold, serialize(&uncached[..]));
        assert_eq!(serialize(&warm[..]), serialize(&uncached[..]));
        assert_eq!(
            warm[1]
                .output_state
                .get_state(&address(0xc0))
                .unwrap(),
            Some(Value::from(2))
        );
    }

    #[test]
    fn test_replay_fails_without_previous_state() {
        let unknown = BlockHash::new([0x77; 32]);
        let block = block_after(unknown, vec![transaction(1, vec![increment(0xc0)])]);

        let err = replay(Arc::new(MemoryBlockChainStates::new()), &block, None).unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Evaluation(EvaluationError::State(StateError::UnknownBlock(hash)))
                if hash == unknown
        ));
    }

    #[test]
    fn test_read_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("block.json");
        let block = genesis_block(vec![transaction(1, vec![set_state(0xaa, "hi")])]);
        std::fs::write(&path, serde_json::to_string(&block).unwrap()).unwrap();

        let read = read_block(&path).unwrap();

        assert_eq!(read.header, block.header);
        assert_eq!(read.transactions.len(), 1);
        assert!(read_block(&dir.path().join("missing.json")).is_err());
    }
}
