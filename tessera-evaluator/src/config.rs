use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tessera_client::{HttpEvaluationClient, HttpEvaluationClientOptions, RemoteActionEvaluator};
use tessera_common::{
    action::{ActionEvaluator, BlockEvaluator},
    state::BlockChainStates,
};
use tessera_storage::{CacheConfig, LocalCacheBlockChainStates};
use tracing::info;
use url::Url;

use crate::ServiceError;

/// Selects how blocks get evaluated.
///
/// ```yaml
/// type: local
/// cache_path: ./cache
/// ```
///
/// ```yaml
/// type: remote
/// endpoint: http://localhost:4343
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionEvaluatorConfiguration {
    /// Evaluates in process, optionally reading state through a persistent cache.
    Local {
        #[serde(default)]
        cache_path: Option<PathBuf>,
    },
    /// Delegates evaluation to another evaluation service.
    Remote {
        endpoint: Url,
        #[serde(default)]
        auth_key: Option<String>,
    },
}

impl Default for ActionEvaluatorConfiguration {
    fn default() -> Self {
        Self::Local { cache_path: None }
    }
}

impl ActionEvaluatorConfiguration {
    pub fn from_yaml(path: &Path) -> Result<Self, ServiceError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ServiceError::Setup(format!("Failed to read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ServiceError::Setup(format!("Invalid evaluator configuration: {e}")))
    }

    /// Builds the evaluator reading committed state from `states`.
    pub fn build(
        &self,
        states: Arc<dyn BlockChainStates>,
    ) -> Result<Arc<dyn BlockEvaluator>, ServiceError> {
        match self {
            Self::Local { cache_path: None } => {
                info!("Using local evaluator");
                Ok(Arc::new(ActionEvaluator::new(states)))
            }
            Self::Local { cache_path: Some(path) } => {
                info!(cache = %path.display(), "Using local evaluator with state cache");
                let cached = LocalCacheBlockChainStates::open(
                    states,
                    &CacheConfig { path: path.clone() },
                )
                .map_err(|e| ServiceError::Setup(e.to_string()))?;
                Ok(Arc::new(ActionEvaluator::new(Arc::new(cached))))
            }
            Self::Remote { endpoint, auth_key } => {
                info!(%endpoint, "Using remote evaluator");
                let client = HttpEvaluationClient::new(
                    endpoint.as_str(),
                    HttpEvaluationClientOptions::new().with_auth_key(auth_key.clone()),
                )
                .map_err(|e| ServiceError::Setup(e.to_string()))?;
                Ok(Arc::new(RemoteActionEvaluator::new(client, states)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::TempDir;
    use tessera_common::testing::{genesis_block, increment, transaction};
    use tessera_storage::{cache::CACHE_FILE_NAME, MemoryBlockChainStates};

    use super::*;

    #[rstest]
    #[case::local("type: local", ActionEvaluatorConfiguration::Local { cache_path: None })]
    #[case::local_cached(
        "type: local\ncache_path: /tmp/cache",
        ActionEvaluatorConfiguration::Local { cache_path: Some(PathBuf::from("/tmp/cache")) }
    )]
    #[case::remote(
        "type: remote\nendpoint: http://localhost:4343",
        ActionEvaluatorConfiguration::Remote {
            endpoint: Url::parse("http://localhost:4343").unwrap(),
            auth_key: None,
        }
    )]
    fn test_parse_configuration(
        #[case] yaml: &str,
        #[case] expected: ActionEvaluatorConfiguration,
    ) {
        let parsed: ActionEvaluatorConfiguration = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_yaml::from_str::<ActionEvaluatorConfiguration>("type: wasm").is_err());
    }

    #[tokio::test]
    async fn test_local_cached_evaluator_opens_cache() {
        let dir = TempDir::new().unwrap();
        let config =
            ActionEvaluatorConfiguration::Local { cache_path: Some(dir.path().to_path_buf()) };

        let evaluator = config
            .build(Arc::new(MemoryBlockChainStates::new()))
            .unwrap();
        let evaluations = evaluator
            .evaluate(&genesis_block(vec![transaction(1, vec![increment(0xc0)])]))
            .await
            .unwrap();

        assert_eq!(evaluations.len(), 1);
        assert!(dir
            .path()
            .join(CACHE_FILE_NAME)
            .exists());
    }
}
