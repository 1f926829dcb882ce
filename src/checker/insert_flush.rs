use crate::{
    checker::{Checker, Op, OpChecker},
    client::VectorClient,
    config::ChaosConfig,
    datagen::gen_default_list_data,
    error::ChaosError,
};
use async_trait::async_trait;
use slog::{debug, Logger};
use std::{sync::Arc, time::Duration};

/// Inserts a small batch per attempt.
///
/// With `flush` set, an attempt only succeeds once the flushed entity count has
/// grown by exactly the inserted batch size.
pub struct InsertFlushChecker {
    checker: Checker,
    flush: bool,
}

impl InsertFlushChecker {
    pub async fn new(
        client: Arc<dyn VectorClient>,
        config: Arc<ChaosConfig>,
        logger: Logger,
        flush: bool,
    ) -> Result<Self, ChaosError> {
        let mut checker = Checker::provision(client, config, logger).await?;
        checker.initial_entities = checker
            .collection
            .num_entities()
            .await
            .map_err(ChaosError::Provision)?
            .result;
        Ok(InsertFlushChecker { checker, flush })
    }

    pub fn initial_entities(&self) -> u64 {
        self.checker.initial_entities
    }
}

#[async_trait]
impl OpChecker for InsertFlushChecker {
    fn op(&self) -> Op {
        if self.flush {
            Op::Flush
        } else {
            Op::Insert
        }
    }

    fn checker(&self) -> &Checker {
        &self.checker
    }

    async fn check_once(&mut self) -> bool {
        let config = self.checker.config.clone();
        let inserted = self
            .checker
            .collection
            .insert(&gen_default_list_data(config.delta_per_ins, config.dim))
            .await;

        if !self.flush {
            return match inserted {
                Ok(_) => true,
                Err(e) => {
                    debug!(self.checker.logger, "Insert failed: {e}");
                    false
                }
            };
        }

        // Read the count even after a failed insert; the comparison below
        // then fails the attempt.
        match self.checker.collection.num_entities().await {
            Ok(res) => {
                debug!(self.checker.logger, "flush time cost: {:.3}s", res.time);
                let expected = self.checker.initial_entities + config.delta_per_ins as u64;
                if res.result == expected {
                    self.checker.initial_entities = expected;
                    true
                } else {
                    debug!(self.checker.logger, "Unexpected entity count";
                        "expected" => expected, "actual" => res.result);
                    // Resync so one lost batch does not fail every later attempt.
                    self.checker.initial_entities = res.result;
                    false
                }
            }
            Err(e) => {
                debug!(self.checker.logger, "Flush failed: {e}");
                false
            }
        }
    }

    fn pause(&self) -> Duration {
        if self.flush {
            Duration::ZERO
        } else {
            self.checker.config.op_interval()
        }
    }
}
