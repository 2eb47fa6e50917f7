use argh::FromArgs;
use eks::EksClusterProvider;
use k8s_openapi::api::core::v1::Node;
use kube::api::Api;
use models::nodepool::{ClusterProvider, NodePool};
use models::telemetry;
use serde::Serialize;
use snafu::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::env;
use std::process;
use tracing::{event, Level};
use turndown::{TurndownConfig, TurndownProvider};

type Result<T> = std::result::Result<T, error::Error>;

/// The default region for the cluster.
const DEFAULT_REGION: &str = "us-west-2";

/// The environment variable holding the name of the node this process runs on.
const NODE_NAME_ENV_VAR: &str = "NODE_NAME";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}", e);
        process::exit(1);
    }
}

#[derive(FromArgs, Debug)]
/// temporarily shrink the node pools of a managed cluster, and restore them later.
struct Arguments {
    /// the name of the cluster to operate on
    #[argh(option)]
    cluster_name: String,

    /// the region the cluster runs in
    #[argh(option, default = "DEFAULT_REGION.to_string()")]
    region: String,

    #[argh(subcommand)]
    subcommand: SubCommand,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum SubCommand {
    Down(DownArgs),
    Up(UpArgs),
    Status(StatusArgs),
    CreatePool(CreatePoolArgs),
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "down")]
/// shrink node pools, remembering their capacity.
struct DownArgs {
    /// the number of nodes to leave in each pool
    #[argh(option, default = "0")]
    size: i32,

    /// only shrink the named node pools
    #[argh(option)]
    pool: Vec<String>,

    /// create the turndown node pool first if it doesn't exist
    #[argh(switch)]
    create_singleton: bool,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "up")]
/// restore node pools to the capacity they had before being shrunk.
struct UpArgs {
    /// only restore the named node pools
    #[argh(option)]
    pool: Vec<String>,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "status")]
/// show node pools and any capacity waiting to be restored.
struct StatusArgs {}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "create-pool")]
/// create the turndown node pool.
struct CreatePoolArgs {
    /// a key=value label to put on the pool's nodes, may be repeated
    #[argh(option)]
    label: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolStatus<'a> {
    name: &'a str,
    min_nodes: i32,
    max_nodes: i32,
    node_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_capacity: Option<String>,
}

async fn run() -> Result<()> {
    telemetry::init_telemetry_from_env().context(error::TelemetryInitSnafu)?;

    // Parse and store the args passed to the program
    let args: Arguments = argh::from_env();
    let config = TurndownConfig::from_environment().context(error::ConfigSnafu)?;
    event!(Level::DEBUG, ?config, "Loaded turndown configuration.");

    let cluster_provider = EksClusterProvider::new(&args.cluster_name, &args.region).await;
    let turndown = TurndownProvider::new(cluster_provider, config);

    match args.subcommand {
        SubCommand::Down(down_args) => {
            if down_args.create_singleton && !turndown.is_turndown_node_pool().await {
                turndown
                    .create_singleton_node_pool(&BTreeMap::new())
                    .await
                    .context(error::TurndownSnafu)?;
            }

            let pools = turndown.node_pools().await.context(error::TurndownSnafu)?;
            let pools = select_pools_to_shrink(turndown.config(), pools, &down_args.pool);
            event!(Level::INFO, pools = pools.len(), size = down_args.size, "Shrinking node pools.");

            turndown
                .set_node_pool_sizes(&pools, down_args.size)
                .await
                .context(error::TurndownSnafu)?;
        }
        SubCommand::Up(up_args) => {
            let pools = turndown.node_pools().await.context(error::TurndownSnafu)?;
            let pools = select_named_pools(pools, &up_args.pool);
            event!(Level::INFO, pools = pools.len(), "Restoring node pools.");

            turndown
                .reset_node_pool_sizes(&pools)
                .await
                .context(error::TurndownSnafu)?;

            // Pools with an unreadable marker are skipped during a reset; report what remains.
            let pools = turndown.node_pools().await.context(error::TurndownSnafu)?;
            let pools = select_named_pools(pools, &up_args.pool);
            for pending in turndown.pending_restores(&pools) {
                event!(
                    Level::WARN,
                    pool = %pending.pool,
                    capacity = ?pending.capacity,
                    "Node pool was not restored."
                );
            }
        }
        SubCommand::Status(_) => {
            let pools = turndown.node_pools().await.context(error::TurndownSnafu)?;
            let statuses: Vec<PoolStatus> = pools
                .iter()
                .map(|pool| PoolStatus {
                    name: pool.name(),
                    min_nodes: pool.min_nodes(),
                    max_nodes: pool.max_nodes(),
                    node_count: pool.node_count(),
                    previous_capacity: pool.tags().get(&turndown.config().marker_tag_key).cloned(),
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&statuses).context(error::SerializeStatusSnafu)?
            );

            if let Some(pool) = current_node_pool(&turndown).await {
                println!("current node pool: {}", pool);
            }
        }
        SubCommand::CreatePool(create_pool_args) => {
            let labels = parse_labels(&create_pool_args.label)?;
            turndown
                .create_singleton_node_pool(&labels)
                .await
                .context(error::TurndownSnafu)?;
        }
    }
    Ok(())
}

/// Picks the pools to shrink: the named ones (or all), never the turndown pool itself, and never a
/// pool which already holds a capacity marker, whose marker would otherwise be replaced.
fn select_pools_to_shrink(
    config: &TurndownConfig,
    pools: Vec<NodePool>,
    names: &[String],
) -> Vec<NodePool> {
    select_named_pools(pools, names)
        .into_iter()
        .filter(|pool| {
            if pool.name() == config.pool_name {
                return false;
            }
            if pool.tags().contains_key(&config.marker_tag_key) {
                event!(
                    Level::WARN,
                    pool = pool.name(),
                    "Node pool is already turned down, leaving it alone."
                );
                return false;
            }
            true
        })
        .collect()
}

fn select_named_pools(pools: Vec<NodePool>, names: &[String]) -> Vec<NodePool> {
    if names.is_empty() {
        return pools;
    }
    pools
        .into_iter()
        .filter(|pool| names.iter().any(|name| name == pool.name()))
        .collect()
}

fn parse_labels(labels: &[String]) -> Result<BTreeMap<String, String>> {
    labels
        .iter()
        .map(|label| {
            let (key, value) = label
                .split_once('=')
                .context(error::InvalidLabelSnafu { label })?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Looks up the pool of the node this process runs on. Any failure is logged and treated as unknown.
async fn current_node_pool<T: ClusterProvider>(turndown: &TurndownProvider<T>) -> Option<String> {
    let node_name = env::var(NODE_NAME_ENV_VAR).ok()?;

    let k8s_client = match kube::Client::try_default().await {
        Ok(k8s_client) => k8s_client,
        Err(err) => {
            event!(Level::WARN, error = %err, "Unable to create Kubernetes client.");
            return None;
        }
    };
    let nodes: Api<Node> = Api::all(k8s_client);
    match nodes.get(&node_name).await {
        Ok(node) => turndown.pool_id(&node),
        Err(err) => {
            event!(Level::WARN, node = %node_name, error = %err, "Unable to fetch current node.");
            None
        }
    }
}

mod error {
    use models::telemetry;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub(super) enum Error {
        #[snafu(display("Error configuring telemetry: '{}'", source))]
        TelemetryInit {
            source: telemetry::TelemetryConfigError,
        },

        #[snafu(display("Unable to load turndown configuration: '{}'", source))]
        Config { source: turndown::error::Error },

        #[snafu(display("Turndown failed: '{}'", source))]
        Turndown { source: turndown::error::Error },

        #[snafu(display("Invalid label '{}', expected key=value", label))]
        InvalidLabel { label: String },

        #[snafu(display("Unable to serialize node pool status: '{}'", source))]
        SerializeStatus { source: serde_json::Error },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use maplit::btreemap;

    fn pools() -> Vec<NodePool> {
        vec![
            NodePool::new("workers", 1, 5, 3),
            NodePool::new("cluster-turndown", 1, 1, 1),
            NodePool::new("gpu", 0, 2, 0).with_tags(btreemap! {
                "cluster.turndown.previous".to_string() => "0/2/1".to_string(),
            }),
            NodePool::new("batch", 0, 10, 2),
        ]
    }

    fn names(pools: &[NodePool]) -> Vec<&str> {
        pools.iter().map(|pool| pool.name()).collect()
    }

    #[test]
    fn test_select_pools_to_shrink() {
        let config = TurndownConfig::default();

        let selected = select_pools_to_shrink(&config, pools(), &[]);
        assert_eq!(names(&selected), vec!["workers", "batch"]);

        let selected = select_pools_to_shrink(
            &config,
            pools(),
            &["batch".to_string(), "cluster-turndown".to_string()],
        );
        assert_eq!(names(&selected), vec!["batch"]);
    }

    #[test]
    fn test_select_named_pools() {
        assert_eq!(names(&select_named_pools(pools(), &[])).len(), 4);
        assert_eq!(
            names(&select_named_pools(pools(), &["gpu".to_string()])),
            vec!["gpu"]
        );
    }

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(&["team=infra".to_string(), "tier=a=b".to_string()]).unwrap();
        assert_eq!(
            labels,
            btreemap! {
                "team".to_string() => "infra".to_string(),
                "tier".to_string() => "a=b".to_string(),
            }
        );

        assert!(matches!(
            parse_labels(&["oops".to_string()]),
            Err(error::Error::InvalidLabel { .. })
        ));
    }
}
