//! Deep merge and extends-chain resolution

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ConfigError;

use super::types::{ExecutorConfig, RunnerConfig};

/// Deep-merge `derived` over `base`.
///
/// Arrays concatenate (base first), objects merge recursively, anything
/// else is replaced by the derived value.
pub fn deep_merge(base: Value, derived: Value) -> Value {
    match (base, derived) {
        (Value::Array(mut base), Value::Array(derived)) => {
            base.extend(derived);
            Value::Array(base)
        }
        (Value::Object(mut base), Value::Object(derived)) => {
            for (key, value) in derived {
                match base.remove(&key) {
                    Some(prev) => {
                        base.insert(key, deep_merge(prev, value));
                    }
                    None => {
                        base.insert(key, value);
                    }
                }
            }
            Value::Object(base)
        }
        (_, derived) => derived,
    }
}

/// Resolve an `extends` chain on a JSON-encoded config.
///
/// The base chain is resolved root-first, so fields declared closer to the
/// final config win. Named bases come from `lookup`; a name that resolves
/// to nothing is reported through `not_found`. Revisiting a name already on
/// the chain is an extends cycle.
fn resolve_value(
    value: Value,
    lookup: &dyn Fn(&str) -> Option<Value>,
    not_found: &dyn Fn(&str) -> ConfigError,
    visited: &mut Vec<String>,
) -> Result<Value, ConfigError> {
    let mut derived = match value {
        Value::Object(map) => map,
        other => return Ok(other),
    };

    let Some(extends) = derived.remove("extends") else {
        return Ok(Value::Object(derived));
    };

    let base = match extends {
        Value::String(name) => {
            if visited.iter().any(|seen| *seen == name) {
                visited.push(name);
                return Err(ConfigError::ExtendsCycle(visited.join(" -> ")));
            }
            visited.push(name.clone());
            let base = lookup(&name).ok_or_else(|| not_found(&name))?;
            resolve_value(base, lookup, not_found, visited)?
        }
        inline @ Value::Object(_) => resolve_value(inline, lookup, not_found, visited)?,
        other => {
            return Err(ConfigError::InvalidValue {
                field: "extends".to_string(),
                message: format!("expected a name or an inline config, got {}", other),
            })
        }
    };

    Ok(deep_merge(base, Value::Object(derived)))
}

impl RunnerConfig {
    /// Resolve this config's extends chain against the monorepo runner
    /// registry. A config without `extends` resolves to itself.
    pub fn resolve(
        &self,
        runners: &BTreeMap<String, RunnerConfig>,
    ) -> Result<RunnerConfig, ConfigError> {
        if self.extends.is_none() {
            return Ok(self.clone());
        }

        let value = serde_json::to_value(self)?;
        let lookup = |name: &str| {
            runners
                .get(name)
                .and_then(|config| serde_json::to_value(config).ok())
        };
        let resolved = resolve_value(
            value,
            &lookup,
            &|name| ConfigError::RunnerNotFound(name.to_string()),
            &mut Vec::new(),
        )?;

        Ok(serde_json::from_value(resolved)?)
    }
}

impl ExecutorConfig {
    /// Resolve this config's extends chain against a workspace's executor
    /// registry. A config without `extends` resolves to itself.
    pub fn resolve(
        &self,
        executors: &BTreeMap<String, ExecutorConfig>,
    ) -> Result<ExecutorConfig, ConfigError> {
        if self.extends.is_none() {
            return Ok(self.clone());
        }

        let value = serde_json::to_value(self)?;
        let lookup = |name: &str| {
            executors
                .get(name)
                .and_then(|config| serde_json::to_value(config).ok())
        };
        let resolved = resolve_value(
            value,
            &lookup,
            &|name| ConfigError::ExecutorNotFound(name.to_string()),
            &mut Vec::new(),
        )?;

        Ok(serde_json::from_value(resolved)?)
    }
}
