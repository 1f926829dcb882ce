use crate::{
    checker::{Checker, Op, OpChecker},
    client::{CollectionWrapper, VectorClient},
    config::ChaosConfig,
    datagen::{gen_default_collection_schema, gen_unique_str},
    error::ChaosError,
};
use async_trait::async_trait;
use slog::{debug, warn, Logger};
use std::sync::Arc;

/// Creates a throwaway collection per attempt and drops it again.
pub struct CreateChecker {
    checker: Checker,
}

impl CreateChecker {
    pub async fn new(
        client: Arc<dyn VectorClient>,
        config: Arc<ChaosConfig>,
        logger: Logger,
    ) -> Result<Self, ChaosError> {
        let checker = Checker::provision(client, config, logger).await?;
        Ok(CreateChecker { checker })
    }
}

#[async_trait]
impl OpChecker for CreateChecker {
    fn op(&self) -> Op {
        Op::Create
    }

    fn checker(&self) -> &Checker {
        &self.checker
    }

    async fn check_once(&mut self) -> bool {
        let config = &self.checker.config;
        let created = CollectionWrapper::init_collection(
            self.checker.collection.client().clone(),
            gen_unique_str("CreateChecker_"),
            &gen_default_collection_schema(config.dim),
            config.timeout(),
        )
        .await;

        match created {
            Ok((collection, _)) => {
                // A failed drop does not make the create attempt a failure.
                if let Err(e) = collection.drop().await {
                    warn!(self.checker.logger, "Failed to drop collection: {e}";
                        "name" => collection.name());
                }
                true
            }
            Err(e) => {
                debug!(self.checker.logger, "Create failed: {e}");
                false
            }
        }
    }
}
