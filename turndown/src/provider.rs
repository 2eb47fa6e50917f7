use crate::config::TurndownConfig;
use crate::error::{self, Result};
use models::nodepool::{CapacityRange, ClusterProvider, MarkerError, NodePool};

use k8s_openapi::api::core::v1::Node;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{event, instrument, Level};

/// A node pool which still carries a capacity marker, and what that marker decodes to.
#[derive(Debug)]
pub struct PendingRestore {
    pub pool: String,
    pub capacity: std::result::Result<CapacityRange, MarkerError>,
}

/// The TurndownProvider shrinks node pools while remembering their capacity, and later restores them.
///
/// The capacity of a pool is remembered as a marker tag on the pool itself, so the cluster provider
/// remains the only store of turndown state.
pub struct TurndownProvider<T: ClusterProvider> {
    cluster_provider: T,
    config: TurndownConfig,
}

impl<T: ClusterProvider> TurndownProvider<T> {
    pub fn new(cluster_provider: T, config: TurndownConfig) -> Self {
        TurndownProvider {
            cluster_provider,
            config,
        }
    }

    pub fn config(&self) -> &TurndownConfig {
        &self.config
    }

    /// Returns whether the singleton turndown pool exists.
    #[instrument(skip(self))]
    pub async fn is_turndown_node_pool(&self) -> bool {
        self.cluster_provider
            .is_node_pool(&self.config.pool_name)
            .await
    }

    /// Asks the cluster provider for the singleton pool which keeps the turndown controller running
    /// while the other pools are shrunk. This does not check for an existing pool.
    #[instrument(skip(self), err)]
    pub async fn create_singleton_node_pool(&self, labels: &BTreeMap<String, String>) -> Result<()> {
        let spec = self.config.singleton_node_pool_spec(labels);
        event!(
            Level::INFO,
            pool = %spec.name,
            instance_type = %spec.instance_type,
            "Creating turndown node pool."
        );

        self.cluster_provider
            .create_node_pool(&spec)
            .await
            .context(error::CreateNodePoolSnafu { pool: spec.name })
    }

    pub fn pool_id(&self, node: &Node) -> Option<String> {
        self.cluster_provider.node_pool_name(node)
    }

    #[instrument(skip(self), err)]
    pub async fn node_pools(&self) -> Result<Vec<NodePool>> {
        self.cluster_provider
            .node_pools()
            .await
            .context(error::ListNodePoolsSnafu)
    }

    /// Resizes each pool to `size`, tagging it with its previous capacity.
    ///
    /// Pools are processed in order. The first failure aborts the batch: pools before it stay
    /// resized and tagged, pools after it are never touched.
    #[instrument(skip(self, pools), fields(pools = pools.len()), err)]
    pub async fn set_node_pool_sizes(&self, pools: &[NodePool], size: i32) -> Result<()> {
        if pools.is_empty() {
            return Ok(());
        }

        self.bounded("set node pool sizes", self.turn_down(pools, size))
            .await
    }

    /// Restores each pool to the count remembered by its capacity marker, then removes the marker.
    ///
    /// A pool without a readable marker is skipped and left exactly as found. A resize or tag
    /// deletion failure aborts the batch.
    #[instrument(skip(self, pools), fields(pools = pools.len()), err)]
    pub async fn reset_node_pool_sizes(&self, pools: &[NodePool]) -> Result<()> {
        if pools.is_empty() {
            return Ok(());
        }

        self.bounded("reset node pool sizes", self.restore(pools))
            .await
    }

    /// Lists the pools which still carry a capacity marker, with the marker's decoded value.
    ///
    /// After a reset this reveals the pools which were skipped because their marker is unreadable.
    pub fn pending_restores(&self, pools: &[NodePool]) -> Vec<PendingRestore> {
        pools
            .iter()
            .filter(|pool| pool.tags().contains_key(&self.config.marker_tag_key))
            .map(|pool| PendingRestore {
                pool: pool.name().to_string(),
                capacity: pool.capacity_marker(&self.config.marker_tag_key),
            })
            .collect()
    }

    async fn turn_down(&self, pools: &[NodePool], size: i32) -> Result<()> {
        for pool in pools {
            let marker = pool.capacity().encode();

            self.cluster_provider
                .update_node_pool_size(pool, size)
                .await
                .context(error::UpdateNodePoolSizeSnafu {
                    pool: pool.name(),
                    size,
                })?;

            let tags = BTreeMap::from([(self.config.marker_tag_key.clone(), marker.clone())]);
            self.cluster_provider
                .create_or_update_tags(pool, false, &tags)
                .await
                .context(error::CreateOrUpdateTagsSnafu { pool: pool.name() })?;

            event!(
                Level::INFO,
                pool = pool.name(),
                previous = %marker,
                size,
                "Turned down node pool."
            );
        }
        Ok(())
    }

    async fn restore(&self, pools: &[NodePool]) -> Result<()> {
        let marker_keys = vec![self.config.marker_tag_key.clone()];

        for pool in pools {
            let capacity = match pool.capacity_marker(&self.config.marker_tag_key) {
                Ok(capacity) => capacity,
                Err(err) => {
                    event!(
                        Level::ERROR,
                        pool = pool.name(),
                        error = %err,
                        "Unable to determine previous capacity, skipping node pool."
                    );
                    continue;
                }
            };

            self.cluster_provider
                .update_node_pool_size(pool, capacity.count)
                .await
                .context(error::UpdateNodePoolSizeSnafu {
                    pool: pool.name(),
                    size: capacity.count,
                })?;

            self.cluster_provider
                .delete_tags(pool, &marker_keys)
                .await
                .context(error::DeleteTagsSnafu { pool: pool.name() })?;

            event!(
                Level::INFO,
                pool = pool.name(),
                size = capacity.count,
                "Restored node pool."
            );
        }
        Ok(())
    }

    /// Runs a batch, bounded by the configured batch timeout if there is one. Dropping the batch
    /// cancels its in-flight provider call along with everything after it.
    async fn bounded<F>(&self, operation: &str, batch: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match self.config.batch_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, batch)
                .await
                .context(error::BatchTimeoutSnafu { operation, timeout })?,
            None => batch.await,
        }
    }
}
