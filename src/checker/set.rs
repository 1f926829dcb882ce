use crate::{
    checker::{
        create::CreateChecker, index::IndexChecker, insert_flush::InsertFlushChecker,
        keep_running, query::QueryChecker, search::SearchChecker, Counters, Op, OpChecker, Tally,
    },
    client::VectorClient,
    config::ChaosConfig,
    error::ChaosError,
};
use futures::future::join_all;
use slog::{info, warn, Logger};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};

pub struct CheckerHandle {
    pub op: Op,
    pub collection: String,
    pub counters: Arc<Counters>,
    task: JoinHandle<()>,
}

fn spawn<C: OpChecker>(checker: C, stop: watch::Receiver<bool>) -> CheckerHandle {
    let op = checker.op();
    let collection = checker.checker().collection.name().to_string();
    let counters = checker.checker().counters.clone();
    let task = tokio::spawn(keep_running(checker, stop));

    CheckerHandle {
        op,
        collection,
        counters,
        task,
    }
}

/// Provisions the checker for `op` and starts its loop.
pub async fn start_checker(
    op: Op,
    client: Arc<dyn VectorClient>,
    config: Arc<ChaosConfig>,
    logger: Logger,
    stop: watch::Receiver<bool>,
) -> Result<CheckerHandle, ChaosError> {
    let handle = match op {
        Op::Create => spawn(CreateChecker::new(client, config, logger).await?, stop),
        Op::Insert => spawn(
            InsertFlushChecker::new(client, config, logger, false).await?,
            stop,
        ),
        Op::Flush => spawn(
            InsertFlushChecker::new(client, config, logger, true).await?,
            stop,
        ),
        Op::Index => spawn(IndexChecker::new(client, config, logger).await?, stop),
        Op::Search => spawn(SearchChecker::new(client, config, logger).await?, stop),
        Op::Query => spawn(QueryChecker::new(client, config, logger).await?, stop),
        Op::Unknown => {
            return Err(ChaosError::Config(format!("No checker exists for op '{op}'")));
        }
    };

    Ok(handle)
}

/// Running checkers keyed by the op they exercise.
pub struct CheckerSet {
    client: Arc<dyn VectorClient>,
    handles: BTreeMap<Op, CheckerHandle>,
    stop: watch::Sender<bool>,
    logger: Logger,
}

impl CheckerSet {
    /// Provisions one checker per distinct op, then starts all of them.
    pub async fn start(
        client: Arc<dyn VectorClient>,
        config: Arc<ChaosConfig>,
        ops: &[Op],
        logger: Logger,
    ) -> Result<Self, ChaosError> {
        let (stop, stop_rx) = watch::channel(false);

        let mut distinct = ops.to_vec();
        distinct.sort();
        distinct.dedup();

        let results = join_all(distinct.into_iter().map(|op| {
            start_checker(
                op,
                client.clone(),
                config.clone(),
                logger.clone(),
                stop_rx.clone(),
            )
        }))
        .await;

        let mut handles = BTreeMap::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(handle) => {
                    handles.insert(handle.op, handle);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let checkers = CheckerSet {
            client,
            handles,
            stop,
            logger,
        };

        if let Some(e) = first_error {
            // Tear down the checkers that did come up.
            checkers.stop().await;
            return Err(e);
        }

        info!(checkers.logger, "Started {} checker(s)", checkers.handles.len());
        Ok(checkers)
    }

    pub fn ops(&self) -> Vec<Op> {
        self.handles.keys().copied().collect()
    }

    pub fn get(&self, op: Op) -> Option<&CheckerHandle> {
        self.handles.get(&op)
    }

    pub fn counters(&self) -> BTreeMap<Op, Arc<Counters>> {
        self.handles
            .iter()
            .map(|(op, h)| (*op, h.counters.clone()))
            .collect()
    }

    pub fn reset(&self) {
        for handle in self.handles.values() {
            handle.counters.reset();
        }
    }

    pub fn tallies(&self) -> BTreeMap<Op, Tally> {
        self.handles
            .iter()
            .map(|(op, h)| (*op, h.counters.snapshot()))
            .collect()
    }

    /// Signals every loop to stop, waits for them to finish and drops their collections.
    pub async fn stop(self) {
        let _ = self.stop.send(true);

        for (op, handle) in self.handles {
            if let Err(e) = handle.task.await {
                warn!(self.logger, "Checker task ended abnormally: {e}"; "op" => op.as_str());
            }

            if let Err(e) = self.client.drop_collection(&handle.collection).await {
                warn!(self.logger, "Failed to drop checker collection: {e}";
                    "op" => op.as_str(), "collection" => handle.collection.as_str());
            }
        }
    }
}
