use crate::{
    checker::{Checker, Op, OpChecker},
    client::VectorClient,
    config::ChaosConfig,
    datagen::{gen_default_list_data, gen_unique_str, DEFAULT_FLOAT_VEC_FIELD},
    error::ChaosError,
};
use async_trait::async_trait;
use slog::{debug, warn, Logger};
use std::{sync::Arc, time::Duration};

/// Builds an index on the vector field and drops it again, back to back.
pub struct IndexChecker {
    checker: Checker,
}

impl IndexChecker {
    pub async fn new(
        client: Arc<dyn VectorClient>,
        config: Arc<ChaosConfig>,
        logger: Logger,
    ) -> Result<Self, ChaosError> {
        let mut checker = Checker::provision(client, config, logger).await?;

        let extra = gen_default_list_data(5 * checker.config.entities_for_search, checker.config.dim);
        checker
            .collection
            .insert(&extra)
            .await
            .map_err(ChaosError::Provision)?;

        checker.initial_entities = checker
            .collection
            .num_entities()
            .await
            .map_err(ChaosError::Provision)?
            .result;
        debug!(checker.logger, "Index ready entities: {}", checker.initial_entities);

        Ok(IndexChecker { checker })
    }
}

#[async_trait]
impl OpChecker for IndexChecker {
    fn op(&self) -> Op {
        Op::Index
    }

    fn checker(&self) -> &Checker {
        &self.checker
    }

    async fn check_once(&mut self) -> bool {
        let created = self
            .checker
            .collection
            .create_index(
                DEFAULT_FLOAT_VEC_FIELD,
                &self.checker.config.index,
                &gen_unique_str("index_"),
            )
            .await;

        match created {
            Ok(_) => {
                if let Err(e) = self.checker.collection.drop_index().await {
                    warn!(self.checker.logger, "Failed to drop index: {e}");
                }
                true
            }
            Err(e) => {
                debug!(self.checker.logger, "Create index failed: {e}");
                false
            }
        }
    }

    fn pause(&self) -> Duration {
        Duration::ZERO
    }
}
