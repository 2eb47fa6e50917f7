use super::{error::ProviderResult, NodePool, NodePoolSpec};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(feature = "mockall")]
use mockall::{mock, predicate::*};

#[async_trait]
/// A trait providing the primitive node pool operations of a managed cluster. This is provided as a
/// trait so that the turndown logic can run against any cloud, and so that mocks can be used for
/// testing purposes.
pub trait ClusterProvider: Send + Sync {
    /// Returns whether a node pool with the given name exists in the cluster.
    async fn is_node_pool(&self, name: &str) -> bool;
    /// Create a node pool. Whether this is idempotent is up to the provider.
    async fn create_node_pool(&self, spec: &NodePoolSpec) -> ProviderResult<()>;
    /// Returns the name of the node pool a Kubernetes node belongs to, if it can be determined.
    fn node_pool_name(&self, node: &Node) -> Option<String>;
    /// List the node pools of the cluster.
    async fn node_pools(&self) -> ProviderResult<Vec<NodePool>>;
    /// Resize a node pool to `size` nodes.
    async fn update_node_pool_size(&self, pool: &NodePool, size: i32) -> ProviderResult<()>;
    /// Attach `tags` to a node pool. Unless `overwrite` is set, tags already on the pool whose
    /// keys are not in `tags` are preserved.
    async fn create_or_update_tags(
        &self,
        pool: &NodePool,
        overwrite: bool,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()>;
    /// Remove the tags with the given keys from a node pool.
    async fn delete_tags(&self, pool: &NodePool, keys: &[String]) -> ProviderResult<()>;
}

#[cfg(feature = "mockall")]
mock! {
    /// A Mock ClusterProvider for use in tests.
    pub ClusterProvider {}
    #[async_trait]
    impl ClusterProvider for ClusterProvider {
        async fn is_node_pool(&self, name: &str) -> bool;
        async fn create_node_pool(&self, spec: &NodePoolSpec) -> ProviderResult<()>;
        fn node_pool_name(&self, node: &Node) -> Option<String>;
        async fn node_pools(&self) -> ProviderResult<Vec<NodePool>>;
        async fn update_node_pool_size(&self, pool: &NodePool, size: i32) -> ProviderResult<()>;
        async fn create_or_update_tags(
            &self,
            pool: &NodePool,
            overwrite: bool,
            tags: &BTreeMap<String, String>,
        ) -> ProviderResult<()>;
        async fn delete_tags(&self, pool: &NodePool, keys: &[String]) -> ProviderResult<()>;
    }
}

#[async_trait]
impl<T> ClusterProvider for Arc<T>
where
    T: ClusterProvider,
{
    async fn is_node_pool(&self, name: &str) -> bool {
        (**self).is_node_pool(name).await
    }

    async fn create_node_pool(&self, spec: &NodePoolSpec) -> ProviderResult<()> {
        (**self).create_node_pool(spec).await
    }

    fn node_pool_name(&self, node: &Node) -> Option<String> {
        (**self).node_pool_name(node)
    }

    async fn node_pools(&self) -> ProviderResult<Vec<NodePool>> {
        (**self).node_pools().await
    }

    async fn update_node_pool_size(&self, pool: &NodePool, size: i32) -> ProviderResult<()> {
        (**self).update_node_pool_size(pool, size).await
    }

    async fn create_or_update_tags(
        &self,
        pool: &NodePool,
        overwrite: bool,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        (**self).create_or_update_tags(pool, overwrite, tags).await
    }

    async fn delete_tags(&self, pool: &NodePool, keys: &[String]) -> ProviderResult<()> {
        (**self).delete_tags(pool, keys).await
    }
}
