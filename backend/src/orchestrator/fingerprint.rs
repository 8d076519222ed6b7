//! Run identification
//!
//! A run is identified by the SHA-256 of its configuration in canonical JSON
//! (object keys sorted recursively), so two runs with the same fingerprint
//! and seed replay the same decisions. Each process also gets a random run
//! id to tell apart repeated executions of one configuration.

use crate::error::SimulationError;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Canonical JSON text of `config`
pub fn canonical_json<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    let value = serde_json::to_value(config)
        .map_err(|e| SimulationError::Serialization(format!("config: {e}")))?;
    serde_json::to_string(&canonicalize(value))
        .map_err(|e| SimulationError::Serialization(format!("config: {e}")))
}

/// Lowercase hex SHA-256 of the canonical JSON of `config`
///
/// # Example
/// ```
/// use options_sim_core::orchestrator::config_fingerprint;
/// use options_sim_core::SimulationConfig;
///
/// let a = config_fingerprint(&SimulationConfig::default()).unwrap();
/// assert_eq!(a.len(), 64);
/// assert_eq!(a, config_fingerprint(&SimulationConfig::default()).unwrap());
/// ```
pub fn config_fingerprint<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    let json = canonical_json(config)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn new_run_id() -> Uuid {
    Uuid::new_v4()
}
