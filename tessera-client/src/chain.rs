//! Re-chaining of remotely evaluated actions.
//!
//! Records coming off the wire carry state snapshots with detached getters. Before they can be
//! queried, each record's input state reads through the output state of the record before it,
//! and its output state reads through its own input state. The first record reads through the
//! state the block starts from.
use std::sync::Arc;

use async_trait::async_trait;
use tessera_common::{
    action::{ActionEvaluation, BlockEvaluator, EvaluationError},
    dto::SerializedActionEvaluation,
    models::PreEvaluationBlock,
    state::{AccountGetters, BlockChainStates},
};
use tracing::{debug, instrument};

use crate::rpc::HttpEvaluationClient;

/// Getters of the state `block` is evaluated on top of.
pub fn chain_root(
    states: &Arc<dyn BlockChainStates>,
    block: &PreEvaluationBlock,
) -> AccountGetters {
    match block.previous_hash() {
        Some(previous) => AccountGetters::at_block(states.clone(), *previous),
        None => AccountGetters::null(),
    }
}

/// Binds deserialized records into a chain starting at `root`.
pub fn chain_evaluations(
    root: AccountGetters,
    serialized: Vec<SerializedActionEvaluation>,
) -> Vec<ActionEvaluation> {
    let mut getters = root;
    serialized
        .into_iter()
        .map(ActionEvaluation::from)
        .map(|mut evaluation| {
            let context = &mut evaluation.input_context;
            context.previous_state = context
                .previous_state
                .with_getters(getters.clone());
            evaluation.output_state = evaluation
                .output_state
                .with_getters(AccountGetters::from_delta(&context.previous_state));
            getters = AccountGetters::from_delta(&evaluation.output_state);
            evaluation
        })
        .collect()
}

/// A [`BlockEvaluator`] that delegates evaluation to a remote service.
#[derive(Clone)]
pub struct RemoteActionEvaluator {
    client: HttpEvaluationClient,
    states: Arc<dyn BlockChainStates>,
}

impl RemoteActionEvaluator {
    pub fn new(client: HttpEvaluationClient, states: Arc<dyn BlockChainStates>) -> Self {
        Self { client, states }
    }
}

#[async_trait]
impl BlockEvaluator for RemoteActionEvaluator {
    #[instrument(skip_all, fields(block_index = block.index()))]
    async fn evaluate(
        &self,
        block: &PreEvaluationBlock,
    ) -> Result<Vec<ActionEvaluation>, EvaluationError> {
        let serialized = self
            .client
            .evaluate_remote(block)
            .await
            .map_err(|err| EvaluationError::Remote(err.to_string()))?;
        debug!(evaluations = serialized.len(), "Chaining remote evaluations");
        Ok(chain_evaluations(chain_root(&self.states, block), serialized))
    }
}

#[cfg(test)]
mod tests {
    use mockito::Server;
    use pretty_assertions::assert_eq;
    use tessera_common::{
        action::ActionEvaluator,
        dto::RemoteEvaluationResponse,
        models::{BlockHash, Currency, Value},
        state::{AccountStateDelta, MockBlockChainStates, StateError},
        testing::*,
    };
    use tessera_storage::MemoryBlockChainStates;

    use super::*;
    use crate::rpc::HttpEvaluationClientOptions;

    const PREVIOUS: BlockHash = BlockHash::new([0x42; 32]);

    async fn serve(server: &mut Server, evaluations: &[ActionEvaluation]) -> mockito::Mock {
        server
            .mock("POST", "/v1/evaluation")
            .with_body(
                serde_json::to_string(&RemoteEvaluationResponse::from(evaluations)).unwrap(),
            )
            .create_async()
            .await
    }

    fn client(server: &Server) -> HttpEvaluationClient {
        HttpEvaluationClient::new(server.url().as_str(), HttpEvaluationClientOptions::new())
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_genesis_chaining() {
        let mut server = Server::new_async().await;
        let block = genesis_block(vec![transaction(1, vec![increment(0xc0), draw(0xd0)])]);
        let local = ActionEvaluator::new(Arc::new(MockBlockChainStates::new()))
            .evaluate_block(&block)
            .unwrap();
        serve(&mut server, &local).await;
        let evaluator =
            RemoteActionEvaluator::new(client(&server), Arc::new(MockBlockChainStates::new()));

        let evaluations = evaluator
            .evaluate(&block)
            .await
            .unwrap();

        let first = &evaluations[0].input_context.previous_state;
        let legacy = Currency::legacy("OLD", 0, None);
        assert_eq!(first.get_state(&address(0x99)).unwrap(), None);
        assert!(first
            .get_balance(&address(0x99), &gold())
            .unwrap()
            .is_zero());
        assert!(first
            .get_total_supply(&gold())
            .unwrap()
            .is_zero());
        assert_eq!(
            first
                .get_total_supply(&legacy)
                .unwrap_err(),
            StateError::TotalSupplyNotTrackable(legacy.clone())
        );
        assert!(first
            .get_validator_set()
            .unwrap()
            .is_empty());
        // the root carries through to the last record
        let last = &evaluations[1].output_state;
        assert_eq!(last.get_state(&address(0xc0)).unwrap(), Some(Value::from(1)));
        assert_eq!(last.get_state(&address(0x99)).unwrap(), None);
        assert!(last.get_total_supply(&legacy).is_err());
    }

    #[test]
    fn test_chain_reads_through_previous_output() {
        let block = genesis_block(vec![transaction(
            1,
            vec![set_state(0xaa, "first"), set_state(0xbb, "second")],
        )]);
        let local = ActionEvaluator::new(Arc::new(MockBlockChainStates::new()))
            .evaluate_block(&block)
            .unwrap();
        let mut response = RemoteEvaluationResponse::from(&local[..]);
        // snapshots that only carry each action's own update
        let second = &mut response.evaluations[1];
        second.input_context.previous_state.states.clear();
        second
            .output_state
            .states
            .retain(|updated, _| *updated == address(0xbb));

        let chained = chain_evaluations(AccountGetters::null(), response.evaluations);

        for state in [&chained[1].input_context.previous_state, &chained[1].output_state] {
            assert_eq!(state.get_state(&address(0xaa)).unwrap(), Some(Value::from("first")));
        }
        assert_eq!(
            chained[1]
                .output_state
                .get_state(&address(0xbb))
                .unwrap(),
            Some(Value::from("second"))
        );
        assert_eq!(
            chained[1]
                .input_context
                .previous_state
                .get_state(&address(0xbb))
                .unwrap(),
            None
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_remote_and_local_evaluation_agree() {
        let states = MemoryBlockChainStates::new();
        let committed = AccountStateDelta::new(AccountGetters::null())
            .set_state(address(0xc0), Value::from(41))
            .set_state(address(0xaa), Value::from("untouched"));
        states
            .commit(PREVIOUS, None, &committed)
            .unwrap();
        let states: Arc<dyn BlockChainStates> = Arc::new(states);
        let block = block_after(
            PREVIOUS,
            vec![
                transaction(1, vec![increment(0xc0), draw(0xd0), fail("boom"), increment(0xc0)]),
                transaction(2, vec![increment(0xc0)]),
            ],
        );
        let local = ActionEvaluator::new(states.clone())
            .evaluate_block(&block)
            .unwrap();
        let mut server = Server::new_async().await;
        serve(&mut server, &local).await;

        let remote = RemoteActionEvaluator::new(client(&server), states)
            .evaluate(&block)
            .await
            .unwrap();

        assert_eq!(remote.len(), local.len());
        assert_eq!(remote.len(), 4);
        let probes = [address(0xc0), address(0xd0), address(0xaa), address(0x01)];
        for (remote, local) in remote.iter().zip(&local) {
            assert_eq!(remote.exception, local.exception);
            assert_eq!(
                remote.input_context.random_seed(),
                local.input_context.random_seed()
            );
            for (remote, local) in [
                (&remote.input_context.previous_state, &local.input_context.previous_state),
                (&remote.output_state, &local.output_state),
            ] {
                assert_eq!(
                    remote.get_states(&probes).unwrap(),
                    local.get_states(&probes).unwrap()
                );
            }
        }
        assert_eq!(
            remote[3]
                .output_state
                .get_state(&address(0xc0))
                .unwrap(),
            Some(Value::from(43))
        );
    }

    #[tokio::test]
    async fn test_transport_failure_yields_no_records() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/evaluation")
            .with_status(500)
            .with_body("evaluation failed")
            .create_async()
            .await;
        let evaluator =
            RemoteActionEvaluator::new(client(&server), Arc::new(MockBlockChainStates::new()));

        let err = evaluator
            .evaluate(&genesis_block(vec![transaction(1, vec![increment(0xc0)])]))
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluationError::Remote(_)));
    }
}
