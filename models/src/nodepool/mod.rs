mod capacity;
mod error;
mod provider;

pub use self::capacity::*;
pub use self::error::{IntoProviderError, MarkerError, ProviderError, ProviderResult};
pub use self::provider::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named, independently sized group of worker nodes, as reported by a `ClusterProvider`.
///
/// The provider's backing store is the system of record. A `NodePool` is a snapshot of that store
/// taken when the pools were listed; nothing here is written back implicitly.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    name: String,
    /// Provider-specific identifier used to address the pool, e.g. an ARN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_id: Option<String>,
    min_nodes: i32,
    max_nodes: i32,
    node_count: i32,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

impl NodePool {
    pub fn new<S: Into<String>>(name: S, min_nodes: i32, max_nodes: i32, node_count: i32) -> Self {
        NodePool {
            name: name.into(),
            min_nodes,
            max_nodes,
            node_count,
            ..Default::default()
        }
    }

    pub fn with_provider_id<S: Into<String>>(mut self, provider_id: S) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn min_nodes(&self) -> i32 {
        self.min_nodes
    }

    pub fn max_nodes(&self) -> i32 {
        self.max_nodes
    }

    pub fn node_count(&self) -> i32 {
        self.node_count
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The pool's current min/max/count as a `CapacityRange`.
    pub fn capacity(&self) -> CapacityRange {
        CapacityRange::new(self.min_nodes, self.max_nodes, self.node_count)
    }

    /// Reads and decodes the capacity marker stored under `key`.
    pub fn capacity_marker(&self, key: &str) -> Result<CapacityRange, MarkerError> {
        let marker = self
            .tags
            .get(key)
            .ok_or_else(|| MarkerError::Missing {
                key: key.to_string(),
            })?;
        CapacityRange::decode(marker)
    }
}

/// The parameters used to ask a `ClusterProvider` for a new node pool.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    pub name: String,
    pub instance_type: String,
    pub node_count: i32,
    pub disk_type: String,
    pub disk_size_gb: i32,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::PREVIOUS_CAPACITY_TAG_KEY;
    use maplit::btreemap;

    #[test]
    fn test_capacity_marker_lookup() {
        let test_cases = vec![
            (btreemap! {}, None),
            (
                btreemap! { PREVIOUS_CAPACITY_TAG_KEY.to_string() => "1/5/2".to_string() },
                Some(CapacityRange::new(1, 5, 2)),
            ),
            (
                btreemap! { "team".to_string() => "1/5/2".to_string() },
                None,
            ),
        ];

        for (tags, expected) in test_cases {
            let pool = NodePool::new("workers", 1, 5, 2).with_tags(tags);
            assert_eq!(pool.capacity_marker(PREVIOUS_CAPACITY_TAG_KEY).ok(), expected);
        }
    }

    #[test]
    fn test_missing_marker_names_key() {
        let pool = NodePool::new("workers", 1, 5, 2);
        match pool.capacity_marker(PREVIOUS_CAPACITY_TAG_KEY) {
            Err(MarkerError::Missing { key }) => assert_eq!(key, PREVIOUS_CAPACITY_TAG_KEY),
            other => panic!("unexpected marker lookup result: {:?}", other),
        }
    }

    #[test]
    fn test_node_pool_serde() {
        let pool = NodePool::new("workers", 0, 3, 1)
            .with_provider_id("arn:aws:eks:us-west-2:123456789012:nodegroup/c/workers/1")
            .with_tags(btreemap! { "team".to_string() => "infra".to_string() });

        let json = serde_json::to_value(&pool).unwrap();
        assert_eq!(json["minNodes"], 0);
        assert_eq!(json["nodeCount"], 1);
        assert_eq!(json["tags"]["team"], "infra");

        let parsed: NodePool = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, pool);
    }
}
