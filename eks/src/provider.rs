use models::nodepool::{
    ClusterProvider, IntoProviderError, NodePool, NodePoolSpec, ProviderError, ProviderResult,
};

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_eks::config::Region;
use aws_sdk_eks::error::DisplayErrorContext;
use aws_sdk_eks::operation::describe_nodegroup::DescribeNodegroupError;
use aws_sdk_eks::types::{Nodegroup, NodegroupScalingConfig};
use k8s_openapi::api::core::v1::Node;
use std::collections::{BTreeMap, HashMap};
use tracing::{event, instrument, Level};

/// The label EKS puts on every node of a managed node group.
pub const EKS_NODEGROUP_LABEL: &str = "eks.amazonaws.com/nodegroup";

/// A `ClusterProvider` whose node pools are the managed node groups of one EKS cluster.
#[derive(Clone, Debug)]
pub struct EksClusterProvider {
    eks_client: aws_sdk_eks::Client,
    cluster_name: String,
}

impl EksClusterProvider {
    /// Builds an EKS client for `region` from the ambient AWS credentials.
    pub async fn new(cluster_name: &str, region: &str) -> Self {
        let region_provider = RegionProviderChain::first_try(Some(Region::new(region.to_string())));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        Self::from_client(aws_sdk_eks::Client::new(&shared_config), cluster_name)
    }

    pub fn from_client(eks_client: aws_sdk_eks::Client, cluster_name: &str) -> Self {
        EksClusterProvider {
            eks_client,
            cluster_name: cluster_name.to_string(),
        }
    }

    async fn describe_nodegroup(&self, nodegroup_name: &str) -> ProviderResult<Nodegroup> {
        self.eks_client
            .describe_nodegroup()
            .cluster_name(&self.cluster_name)
            .nodegroup_name(nodegroup_name)
            .send()
            .await
            .context(format!("Failed to describe nodegroup '{}'", nodegroup_name))?
            .nodegroup()
            .cloned()
            .context(format!("Nodegroup '{}' missing from response", nodegroup_name))
    }

    async fn nodegroup_names(&self) -> ProviderResult<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .eks_client
                .list_nodegroups()
                .cluster_name(&self.cluster_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list nodegroups")?;

            names.extend(output.nodegroups().iter().cloned());

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(names),
            }
        }
    }

    async fn untag(&self, arn: &str, keys: Vec<String>) -> ProviderResult<()> {
        self.eks_client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(keys))
            .send()
            .await
            .context(format!("Failed to untag '{}'", arn))?;
        Ok(())
    }
}

#[async_trait]
impl ClusterProvider for EksClusterProvider {
    /// Only a `ResourceNotFoundException` means the nodegroup is missing. Any other failure is
    /// treated as the nodegroup existing, so that no duplicate is created after a transient error.
    async fn is_node_pool(&self, name: &str) -> bool {
        let result = self
            .eks_client
            .describe_nodegroup()
            .cluster_name(&self.cluster_name)
            .nodegroup_name(name)
            .send()
            .await;

        match result {
            Ok(_) => true,
            Err(err) if nodegroup_missing(err.as_service_error()) => {
                event!(Level::DEBUG, nodegroup = name, "Nodegroup not found.");
                false
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    nodegroup = name,
                    error = %DisplayErrorContext(&err),
                    "Unable to determine whether nodegroup exists, assuming it does."
                );
                true
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn create_node_pool(&self, spec: &NodePoolSpec) -> ProviderResult<()> {
        // New nodegroups land in the same subnets, with the same node role, as an existing one.
        let template_name = self
            .nodegroup_names()
            .await?
            .into_iter()
            .find(|name| *name != spec.name)
            .context("No existing nodegroup to copy subnets and node role from")?;
        let template = self.describe_nodegroup(&template_name).await?;
        let node_role = template
            .node_role()
            .context("Nodegroup missing node role")?;

        event!(
            Level::DEBUG,
            disk_type = %spec.disk_type,
            "Managed nodegroups use the default volume type unless a launch template is given."
        );

        self.eks_client
            .create_nodegroup()
            .cluster_name(&self.cluster_name)
            .nodegroup_name(&spec.name)
            .set_subnets(Some(template.subnets().to_vec()))
            .node_role(node_role)
            .instance_types(&spec.instance_type)
            .disk_size(spec.disk_size_gb)
            .scaling_config(
                NodegroupScalingConfig::builder()
                    .min_size(spec.node_count)
                    .max_size(spec.node_count)
                    .desired_size(spec.node_count)
                    .build(),
            )
            .set_labels(Some(to_hash_map(&spec.labels)))
            .send()
            .await
            .context(format!("Failed to create nodegroup '{}'", spec.name))?;

        Ok(())
    }

    fn node_pool_name(&self, node: &Node) -> Option<String> {
        nodegroup_label(node)
    }

    #[instrument(skip(self), err)]
    async fn node_pools(&self) -> ProviderResult<Vec<NodePool>> {
        let mut pools = Vec::new();
        for name in self.nodegroup_names().await? {
            let nodegroup = self.describe_nodegroup(&name).await?;
            pools.push(node_pool_from_nodegroup(&nodegroup)?);
        }
        Ok(pools)
    }

    #[instrument(skip(self, pool), fields(pool = pool.name()), err)]
    async fn update_node_pool_size(&self, pool: &NodePool, size: i32) -> ProviderResult<()> {
        self.eks_client
            .update_nodegroup_config()
            .cluster_name(&self.cluster_name)
            .nodegroup_name(pool.name())
            .scaling_config(scaling_config_for_size(pool, size))
            .send()
            .await
            .context(format!("Failed to update size of nodegroup '{}'", pool.name()))?;
        Ok(())
    }

    #[instrument(skip(self, pool), fields(pool = pool.name()), err)]
    async fn create_or_update_tags(
        &self,
        pool: &NodePool,
        overwrite: bool,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let arn = nodegroup_arn(pool)?;

        if overwrite {
            let stale_keys: Vec<String> = pool
                .tags()
                .keys()
                .filter(|key| !tags.contains_key(*key))
                .cloned()
                .collect();
            if !stale_keys.is_empty() {
                self.untag(arn, stale_keys).await?;
            }
        }

        self.eks_client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(to_hash_map(tags)))
            .send()
            .await
            .context(format!("Failed to tag nodegroup '{}'", pool.name()))?;
        Ok(())
    }

    #[instrument(skip(self, pool), fields(pool = pool.name()), err)]
    async fn delete_tags(&self, pool: &NodePool, keys: &[String]) -> ProviderResult<()> {
        self.untag(nodegroup_arn(pool)?, keys.to_vec()).await
    }
}

fn nodegroup_missing(err: Option<&DescribeNodegroupError>) -> bool {
    matches!(err, Some(err) if err.is_resource_not_found_exception())
}

fn nodegroup_arn(pool: &NodePool) -> ProviderResult<&str> {
    pool.provider_id()
        .context(format!("Node pool '{}' has no nodegroup ARN", pool.name()))
}

fn nodegroup_label(node: &Node) -> Option<String> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(EKS_NODEGROUP_LABEL))
        .cloned()
}

fn node_pool_from_nodegroup(nodegroup: &Nodegroup) -> ProviderResult<NodePool> {
    let name = nodegroup
        .nodegroup_name()
        .context("Nodegroup missing name")?;
    let scaling = nodegroup
        .scaling_config()
        .ok_or_else(|| {
            ProviderError::new_with_context(format!("Nodegroup '{}' missing scaling config", name))
        })?;
    let tags: BTreeMap<String, String> = nodegroup
        .tags()
        .map(|tags| {
            tags.iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    let pool = NodePool::new(
        name,
        scaling.min_size().unwrap_or_default(),
        scaling.max_size().unwrap_or_default(),
        scaling.desired_size().unwrap_or_default(),
    )
    .with_tags(tags);

    Ok(match nodegroup.nodegroup_arn() {
        Some(arn) => pool.with_provider_id(arn),
        None => pool,
    })
}

/// EKS rejects a desired size outside of [min, max] and a max below 1, so the bounds are widened
/// around the requested size where needed.
fn scaling_config_for_size(pool: &NodePool, size: i32) -> NodegroupScalingConfig {
    NodegroupScalingConfig::builder()
        .min_size(pool.min_nodes().min(size).max(0))
        .max_size(pool.max_nodes().max(size).max(1))
        .desired_size(size)
        .build()
}

fn to_hash_map(map: &BTreeMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_eks::types::error::{
        ClientException, ResourceNotFoundException, ServiceUnavailableException,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use maplit::btreemap;

    fn fake_node(labels: Option<BTreeMap<String, String>>) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("ip-10-0-1-12.us-west-2.compute.internal".to_string()),
                labels,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_scaling_config_for_size() {
        let test_cases = vec![
            // (min, max, count), size, (expected min, max, desired)
            ((1, 5, 3), 0, (0, 5, 0)),
            ((0, 0, 0), 0, (0, 1, 0)),
            ((0, 5, 0), 3, (0, 5, 3)),
            ((2, 4, 2), 8, (2, 8, 8)),
            ((3, 10, 4), 3, (3, 10, 3)),
        ];

        for ((min, max, count), size, (expected_min, expected_max, expected_desired)) in test_cases
        {
            let pool = NodePool::new("workers", min, max, count);
            let scaling = scaling_config_for_size(&pool, size);
            assert_eq!(scaling.min_size(), Some(expected_min));
            assert_eq!(scaling.max_size(), Some(expected_max));
            assert_eq!(scaling.desired_size(), Some(expected_desired));
        }
    }

    #[test]
    fn test_node_pool_from_nodegroup() {
        let nodegroup = Nodegroup::builder()
            .nodegroup_name("workers")
            .nodegroup_arn("arn:aws:eks:us-west-2:123456789012:nodegroup/prod/workers/abc")
            .scaling_config(
                NodegroupScalingConfig::builder()
                    .min_size(1)
                    .max_size(6)
                    .desired_size(2)
                    .build(),
            )
            .tags("cluster.turndown.previous", "1/6/4")
            .build();

        let pool = node_pool_from_nodegroup(&nodegroup).unwrap();
        assert_eq!(pool.name(), "workers");
        assert_eq!(
            pool.provider_id(),
            Some("arn:aws:eks:us-west-2:123456789012:nodegroup/prod/workers/abc")
        );
        assert_eq!((pool.min_nodes(), pool.max_nodes(), pool.node_count()), (1, 6, 2));
        assert_eq!(
            pool.tags(),
            &btreemap! { "cluster.turndown.previous".to_string() => "1/6/4".to_string() }
        );
    }

    #[test]
    fn test_node_pool_from_incomplete_nodegroup() {
        let unnamed = Nodegroup::builder()
            .scaling_config(NodegroupScalingConfig::builder().build())
            .build();
        assert!(node_pool_from_nodegroup(&unnamed).is_err());

        let unscaled = Nodegroup::builder().nodegroup_name("workers").build();
        assert!(node_pool_from_nodegroup(&unscaled).is_err());
    }

    #[test]
    fn test_nodegroup_label() {
        let test_cases = vec![
            (None, None),
            (Some(btreemap! {}), None),
            (
                Some(btreemap! {
                    EKS_NODEGROUP_LABEL.to_string() => "cluster-turndown".to_string(),
                    "kubernetes.io/os".to_string() => "linux".to_string(),
                }),
                Some("cluster-turndown".to_string()),
            ),
        ];

        for (labels, expected) in test_cases {
            assert_eq!(nodegroup_label(&fake_node(labels)), expected);
        }
    }

    #[test]
    fn test_nodegroup_missing() {
        let not_found = DescribeNodegroupError::ResourceNotFoundException(
            ResourceNotFoundException::builder()
                .message("No node group found for name: cluster-turndown.")
                .build(),
        );
        let unavailable = DescribeNodegroupError::ServiceUnavailableException(
            ServiceUnavailableException::builder()
                .message("Rate exceeded")
                .build(),
        );
        let denied = DescribeNodegroupError::ClientException(
            ClientException::builder()
                .message("not authorized to perform: eks:DescribeNodegroup")
                .build(),
        );

        assert!(nodegroup_missing(Some(&not_found)));
        assert!(!nodegroup_missing(Some(&unavailable)));
        assert!(!nodegroup_missing(Some(&denied)));
        // Dispatch and timeout failures carry no service error at all.
        assert!(!nodegroup_missing(None));
    }

    #[test]
    fn test_nodegroup_arn_required() {
        let pool = NodePool::new("workers", 0, 1, 0);
        assert!(nodegroup_arn(&pool).is_err());

        let pool = pool.with_provider_id("arn:aws:eks:us-west-2:123456789012:nodegroup/a/b/c");
        assert_eq!(
            nodegroup_arn(&pool).unwrap(),
            "arn:aws:eks:us-west-2:123456789012:nodegroup/a/b/c"
        );
    }
}
