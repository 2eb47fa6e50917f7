use crate::error::{self, Result};
use models::constants::{
    LABEL_TURNDOWN_NODE, LABEL_TURNDOWN_NODE_VALUE, PREVIOUS_CAPACITY_TAG_KEY,
    TURNDOWN_POOL_DISK_SIZE_GB, TURNDOWN_POOL_DISK_TYPE, TURNDOWN_POOL_INSTANCE_TYPE,
    TURNDOWN_POOL_NAME, TURNDOWN_POOL_NODE_COUNT,
};
use models::nodepool::NodePoolSpec;

use snafu::ResultExt;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

// Defines the configuration related env variable names
const MARKER_TAG_KEY_ENV_VAR: &str = "TURNDOWN_MARKER_TAG_KEY";
const POOL_NAME_ENV_VAR: &str = "TURNDOWN_POOL_NAME";
const INSTANCE_TYPE_ENV_VAR: &str = "TURNDOWN_INSTANCE_TYPE";
const DISK_TYPE_ENV_VAR: &str = "TURNDOWN_DISK_TYPE";
const DISK_SIZE_GB_ENV_VAR: &str = "TURNDOWN_DISK_SIZE_GB";
const NODE_COUNT_ENV_VAR: &str = "TURNDOWN_NODE_COUNT";
const NODE_LABEL_KEY_ENV_VAR: &str = "TURNDOWN_NODE_LABEL_KEY";
const BATCH_TIMEOUT_SECONDS_ENV_VAR: &str = "TURNDOWN_BATCH_TIMEOUT_SECONDS";

/// Deployment-specific settings of the turndown provider.
///
/// Defaults are the well-known values every turndown deployment agrees on; each one can be
/// overridden through the environment.
#[derive(Clone, Debug, Eq, PartialEq, Validate)]
pub struct TurndownConfig {
    /// The tag key holding the capacity marker of a turned down pool.
    #[validate(length(min = 1))]
    pub marker_tag_key: String,
    /// The name of the singleton pool which hosts the turndown controller.
    #[validate(length(min = 1, max = 63))]
    pub pool_name: String,
    #[validate(length(min = 1))]
    pub instance_type: String,
    #[validate(length(min = 1))]
    pub disk_type: String,
    #[validate(range(min = 1))]
    pub disk_size_gb: i32,
    #[validate(range(min = 1))]
    pub node_count: i32,
    /// The label key identifying nodes of the singleton pool.
    #[validate(length(min = 1))]
    pub node_label_key: String,
    /// Upper bound on the duration of a whole resize batch. Unbounded when unset.
    #[validate(range(min = 1))]
    pub batch_timeout_seconds: Option<u64>,
}

impl Default for TurndownConfig {
    fn default() -> Self {
        TurndownConfig {
            marker_tag_key: PREVIOUS_CAPACITY_TAG_KEY.to_string(),
            pool_name: TURNDOWN_POOL_NAME.to_string(),
            instance_type: TURNDOWN_POOL_INSTANCE_TYPE.to_string(),
            disk_type: TURNDOWN_POOL_DISK_TYPE.to_string(),
            disk_size_gb: TURNDOWN_POOL_DISK_SIZE_GB,
            node_count: TURNDOWN_POOL_NODE_COUNT,
            node_label_key: LABEL_TURNDOWN_NODE.to_string(),
            batch_timeout_seconds: None,
        }
    }
}

impl TurndownConfig {
    pub fn from_environment() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from the defaults, overridden by any variable `lookup` returns a value for.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = TurndownConfig::default();

        if let Some(marker_tag_key) = lookup(MARKER_TAG_KEY_ENV_VAR) {
            config.marker_tag_key = marker_tag_key;
        }
        if let Some(pool_name) = lookup(POOL_NAME_ENV_VAR) {
            config.pool_name = pool_name;
        }
        if let Some(instance_type) = lookup(INSTANCE_TYPE_ENV_VAR) {
            config.instance_type = instance_type;
        }
        if let Some(disk_type) = lookup(DISK_TYPE_ENV_VAR) {
            config.disk_type = disk_type;
        }
        if let Some(disk_size_gb) = parse_var(&lookup, DISK_SIZE_GB_ENV_VAR)? {
            config.disk_size_gb = disk_size_gb;
        }
        if let Some(node_count) = parse_var(&lookup, NODE_COUNT_ENV_VAR)? {
            config.node_count = node_count;
        }
        if let Some(node_label_key) = lookup(NODE_LABEL_KEY_ENV_VAR) {
            config.node_label_key = node_label_key;
        }
        if let Some(batch_timeout_seconds) = parse_var(&lookup, BATCH_TIMEOUT_SECONDS_ENV_VAR)? {
            config.batch_timeout_seconds = Some(batch_timeout_seconds);
        }

        config.validate().context(error::InvalidConfigSnafu)?;
        Ok(config)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_seconds.map(Duration::from_secs)
    }

    /// Merges the caller's labels with the label identifying turndown nodes. The identifying label
    /// always wins so that the singleton pool can be recognized.
    pub fn turndown_node_labels(&self, labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = labels.clone();
        merged.insert(
            self.node_label_key.clone(),
            LABEL_TURNDOWN_NODE_VALUE.to_string(),
        );
        merged
    }

    /// The node pool to request when creating the singleton turndown pool.
    pub fn singleton_node_pool_spec(&self, labels: &BTreeMap<String, String>) -> NodePoolSpec {
        NodePoolSpec {
            name: self.pool_name.clone(),
            instance_type: self.instance_type.clone(),
            node_count: self.node_count,
            disk_type: self.disk_type.clone(),
            disk_size_gb: self.disk_size_gb,
            labels: self.turndown_node_labels(labels),
        }
    }
}

fn parse_var<F, T>(lookup: &F, variable: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = std::num::ParseIntError>,
{
    lookup(variable)
        .map(|value| {
            value.trim().parse().context(error::ConfigEnvSnafu {
                variable,
                value: value.clone(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use maplit::{btreemap, hashmap};
    use std::collections::HashMap;

    fn config_from(vars: HashMap<&str, &str>) -> Result<TurndownConfig> {
        TurndownConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(HashMap::new()).unwrap();
        assert_eq!(config, TurndownConfig::default());
        assert_eq!(config.marker_tag_key, "cluster.turndown.previous");
        assert_eq!(config.pool_name, "cluster-turndown");
        assert_eq!(config.instance_type, "t2.small");
        assert_eq!(config.disk_type, "gp2");
        assert_eq!(config.disk_size_gb, 10);
        assert_eq!(config.node_count, 1);
        assert_eq!(config.batch_timeout(), None);
    }

    #[test]
    fn test_environment_overrides() {
        let config = config_from(hashmap! {
            POOL_NAME_ENV_VAR => "turndown-host",
            INSTANCE_TYPE_ENV_VAR => "t3.medium",
            DISK_TYPE_ENV_VAR => "gp3",
            DISK_SIZE_GB_ENV_VAR => " 20 ",
            NODE_COUNT_ENV_VAR => "2",
            BATCH_TIMEOUT_SECONDS_ENV_VAR => "300",
        })
        .unwrap();

        assert_eq!(config.pool_name, "turndown-host");
        assert_eq!(config.instance_type, "t3.medium");
        assert_eq!(config.disk_type, "gp3");
        assert_eq!(config.disk_size_gb, 20);
        assert_eq!(config.node_count, 2);
        assert_eq!(config.batch_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.marker_tag_key, PREVIOUS_CAPACITY_TAG_KEY);
    }

    #[test]
    fn test_invalid_environment() {
        let test_cases = vec![
            hashmap! { DISK_SIZE_GB_ENV_VAR => "ten" },
            hashmap! { NODE_COUNT_ENV_VAR => "-" },
            hashmap! { BATCH_TIMEOUT_SECONDS_ENV_VAR => "-5" },
        ];
        for vars in test_cases {
            assert!(matches!(config_from(vars), Err(Error::ConfigEnv { .. })));
        }

        let test_cases = vec![
            hashmap! { DISK_SIZE_GB_ENV_VAR => "0" },
            hashmap! { NODE_COUNT_ENV_VAR => "-1" },
            hashmap! { POOL_NAME_ENV_VAR => "" },
            hashmap! { MARKER_TAG_KEY_ENV_VAR => "" },
            hashmap! { BATCH_TIMEOUT_SECONDS_ENV_VAR => "0" },
        ];
        for vars in test_cases {
            assert!(matches!(config_from(vars), Err(Error::InvalidConfig { .. })));
        }
    }

    #[test]
    fn test_singleton_node_pool_spec() {
        let config = TurndownConfig::default();
        let spec = config.singleton_node_pool_spec(&btreemap! {
            "team".to_string() => "infra".to_string(),
            LABEL_TURNDOWN_NODE.to_string() => "false".to_string(),
        });

        assert_eq!(
            spec,
            NodePoolSpec {
                name: "cluster-turndown".to_string(),
                instance_type: "t2.small".to_string(),
                node_count: 1,
                disk_type: "gp2".to_string(),
                disk_size_gb: 10,
                labels: btreemap! {
                    "team".to_string() => "infra".to_string(),
                    LABEL_TURNDOWN_NODE.to_string() => "true".to_string(),
                },
            }
        );
    }
}
