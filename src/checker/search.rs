use crate::{
    checker::{Checker, Op, OpChecker},
    client::{types::SearchRequest, VectorClient},
    config::ChaosConfig,
    datagen::{gen_vectors, DEFAULT_FLOAT_VEC_FIELD},
    error::ChaosError,
};
use async_trait::async_trait;
use serde_json::json;
use slog::{debug, Logger};
use std::sync::Arc;

/// Searches the loaded checker collection with random vectors.
pub struct SearchChecker {
    checker: Checker,
}

impl SearchChecker {
    pub async fn new(
        client: Arc<dyn VectorClient>,
        config: Arc<ChaosConfig>,
        logger: Logger,
    ) -> Result<Self, ChaosError> {
        let checker = Checker::provision(client, config, logger).await?;
        checker
            .collection
            .load()
            .await
            .map_err(ChaosError::Provision)?;
        Ok(SearchChecker { checker })
    }
}

#[async_trait]
impl OpChecker for SearchChecker {
    fn op(&self) -> Op {
        Op::Search
    }

    fn checker(&self) -> &Checker {
        &self.checker
    }

    async fn check_once(&mut self) -> bool {
        let config = &self.checker.config;
        let request = SearchRequest {
            data: gen_vectors(config.search_nq, config.dim),
            anns_field: DEFAULT_FLOAT_VEC_FIELD.to_string(),
            param: json!({ "nprobe": config.nprobe }),
            limit: 1,
        };

        match self.checker.collection.search(&request).await {
            Ok(res) => res.result.iter().any(|hits| !hits.is_empty()),
            Err(e) => {
                debug!(self.checker.logger, "Search failed: {e}");
                false
            }
        }
    }
}
