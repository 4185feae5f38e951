//! Runner tuning knobs.

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::ConfigError;

pub const DEFAULT_WORKSPACE_ALIGNMENT: usize = 64;
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Byte alignment of every workspace slot. Must be a power of two.
    pub workspace_alignment: usize,
    /// Finalized plans kept per runner, keyed by shape signature.
    pub plan_cache_capacity: usize,
    /// Log the plan dump after every setup that builds a plan.
    pub dump_plans: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            workspace_alignment: DEFAULT_WORKSPACE_ALIGNMENT,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
            dump_plans: false,
        }
    }
}

impl RunnerOptions {
    /// Defaults overlaid with `KGRAPH_WORKSPACE_ALIGNMENT`, `KGRAPH_PLAN_CACHE`
    /// and `KGRAPH_DUMP_PLANS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env::var)
    }

    /// Same as [`RunnerOptions::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(value) = lookup(env::WORKSPACE_ALIGNMENT) {
            options.workspace_alignment = parse_usize("workspace_alignment", &value)?;
        }
        if let Some(value) = lookup(env::PLAN_CACHE) {
            options.plan_cache_capacity = parse_usize("plan_cache_capacity", &value)?;
        }
        if let Some(value) = lookup(env::DUMP_PLANS) {
            options.dump_plans = env::parse_bool(&value);
        }
        Ok(options)
    }

    pub fn with_workspace_alignment(mut self, alignment: usize) -> Self {
        self.workspace_alignment = alignment;
        self
    }

    pub fn with_plan_cache_capacity(mut self, capacity: usize) -> Self {
        self.plan_cache_capacity = capacity;
        self
    }

    pub fn with_dump_plans(mut self, enabled: bool) -> Self {
        self.dump_plans = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.workspace_alignment.is_power_of_two() {
            return Err(ConfigError::InvalidOption {
                option: "workspace_alignment",
                reason: format!("{} is not a power of two", self.workspace_alignment),
            });
        }
        if self.plan_cache_capacity == 0 {
            return Err(ConfigError::InvalidOption {
                option: "plan_cache_capacity",
                reason: "must hold at least one plan".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_usize(option: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|err| ConfigError::InvalidOption {
            option,
            reason: format!("`{value}`: {err}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_overrides_defaults() {
        let options = RunnerOptions::from_lookup(|key| match key {
            "KGRAPH_WORKSPACE_ALIGNMENT" => Some("128".to_string()),
            "KGRAPH_DUMP_PLANS" => Some("yes".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(options.workspace_alignment, 128);
        assert_eq!(options.plan_cache_capacity, DEFAULT_PLAN_CACHE_CAPACITY);
        assert!(options.dump_plans);
    }

    #[test]
    fn unparsable_value_is_reported() {
        let err = RunnerOptions::from_lookup(|key| {
            (key == "KGRAPH_PLAN_CACHE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidOption {
                option: "plan_cache_capacity",
                ..
            }
        ));
    }

    #[test]
    fn validate_rejects_odd_alignment_and_empty_cache() {
        assert!(RunnerOptions::default().validate().is_ok());
        assert!(RunnerOptions::default()
            .with_workspace_alignment(48)
            .validate()
            .is_err());
        assert!(RunnerOptions::default()
            .with_plan_cache_capacity(0)
            .validate()
            .is_err());
    }

    #[test]
    fn deserializes_partial_json() {
        let options: RunnerOptions = serde_json::from_str(r#"{"dump_plans": true}"#).unwrap();
        assert!(options.dump_plans);
        assert_eq!(options.workspace_alignment, DEFAULT_WORKSPACE_ALIGNMENT);
    }
}
