use crate::{
    checker::{Checker, Op, OpChecker},
    client::VectorClient,
    config::ChaosConfig,
    datagen::{gen_term_expr, DEFAULT_INT64_FIELD},
    error::ChaosError,
};
use async_trait::async_trait;
use rand::Rng;
use slog::{debug, Logger};
use std::sync::Arc;

/// Queries the loaded checker collection for a handful of random primary keys.
pub struct QueryChecker {
    checker: Checker,
}

impl QueryChecker {
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
        Ok(QueryChecker { checker })
    }

    fn random_terms(&self) -> Vec<i64> {
        let config = &self.checker.config;
        let upper = config.entities_for_search as i64;
        let mut rng = rand::rng();
        (0..config.query_terms)
            .map(|_| rng.random_range(0..=upper))
            .collect()
    }
}

#[async_trait]
impl OpChecker for QueryChecker {
    fn op(&self) -> Op {
        Op::Query
    }

    fn checker(&self) -> &Checker {
        &self.checker
    }

    async fn check_once(&mut self) -> bool {
        let expr = gen_term_expr(DEFAULT_INT64_FIELD, &self.random_terms());

        match self.checker.collection.query(&expr).await {
            Ok(res) => !res.result.is_empty(),
            Err(e) => {
                debug!(self.checker.logger, "Query failed: {e}"; "expr" => expr);
                false
            }
        }
    }
}
