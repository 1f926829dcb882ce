#![allow(dead_code)]

use std::sync::Arc;
use vecchaos::{
    client::{memory::InMemoryClient, VectorClient},
    config::ChaosConfig,
    suites::Fixtures,
};

/// Small collections and short pauses so checkers turn over quickly.
pub fn fast_config() -> Arc<ChaosConfig> {
    Arc::new(ChaosConfig {
        timeout_secs: 5,
        entities_for_search: 50,
        delta_per_ins: 10,
        wait_per_op_secs: 0.05,
        dim: 8,
        ..Default::default()
    })
}

pub fn memory_fixtures() -> (InMemoryClient, Fixtures) {
    let client = InMemoryClient::new();
    let dis_connect = client.session();
    dis_connect.disconnect();

    let fixtures = Fixtures {
        connect: Arc::new(client.clone()),
        dis_connect: Arc::new(dis_connect),
    };
    (client, fixtures)
}
