use crate::{client::types::IndexParams, datagen::DEFAULT_DIM, error::ChaosError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Success rate a checker must exceed when it is expected to succeed.
pub const SUCC_THRESHOLD: f64 = 0.90;
/// Success rate a checker must stay below when it is expected to fail.
pub const FAIL_THRESHOLD: f64 = 0.49;
/// Sample count guarding both thresholds.
pub const MIN_SAMPLES: u64 = 2;

/// Tunables shared by every checker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChaosConfig {
    /// Per-call timeout, in seconds.
    pub timeout_secs: u64,
    /// Rows inserted into every checker collection on provisioning.
    pub entities_for_search: usize,
    /// Rows inserted per insert iteration.
    pub delta_per_ins: usize,
    /// Checkers sleep a tenth of this between iterations.
    pub wait_per_op_secs: f64,
    pub dim: usize,
    pub index: IndexParams,
    pub nprobe: u64,
    /// Query vectors per search.
    pub search_nq: usize,
    /// Primary keys per query expression.
    pub query_terms: usize,
    pub succ_threshold: f64,
    pub fail_threshold: f64,
    pub min_samples: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            timeout_secs: 20,
            entities_for_search: 3000,
            delta_per_ins: 10,
            wait_per_op_secs: 10.0,
            dim: DEFAULT_DIM,
            index: IndexParams::default(),
            nprobe: 32,
            search_nq: 5,
            query_terms: 5,
            succ_threshold: SUCC_THRESHOLD,
            fail_threshold: FAIL_THRESHOLD,
            min_samples: MIN_SAMPLES,
        }
    }
}

impl ChaosConfig {
    pub fn load(path: &Path) -> Result<Self, ChaosError> {
        let config: ChaosConfig = read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChaosError> {
        if self.timeout_secs == 0 {
            return Err(ChaosError::Config("timeout_secs must be positive".to_string()));
        }
        if self.dim == 0 {
            return Err(ChaosError::Config("dim must be positive".to_string()));
        }
        if Duration::try_from_secs_f64(self.wait_per_op_secs / 10.0).is_err() {
            return Err(ChaosError::Config(format!(
                "wait_per_op_secs must be a non-negative number of seconds, got {}",
                self.wait_per_op_secs
            )));
        }
        for (name, value) in [
            ("succ_threshold", self.succ_threshold),
            ("fail_threshold", self.fail_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ChaosError::Config(format!("{name} must be within [0, 1]")));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pause between two iterations of a sleeping checker.
    pub fn op_interval(&self) -> Duration {
        // Saturates for configs built without `validate`.
        Duration::try_from_secs_f64(self.wait_per_op_secs / 10.0).unwrap_or(Duration::MAX)
    }
}

/// Reads a JSON document, naming the offending field on failure.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ChaosError> {
    let file = std::fs::File::open(path).map_err(|e| {
        ChaosError::Config(format!("Failed to open {}: {e}", path.display()))
    })?;

    let reader = std::io::BufReader::new(file);
    let deserializer = &mut serde_json::Deserializer::from_reader(reader);

    serde_path_to_error::deserialize(deserializer).map_err(|e| {
        ChaosError::Config(format!(
            "Failed to parse {} at '{}': {}",
            path.display(),
            e.path(),
            e.inner()
        ))
    })
}
