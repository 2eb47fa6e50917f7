/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `.parameter` to the end.
#[macro_export]
macro_rules! turndown_domain {
    () => {
        "cluster.turndown"
    };
    ($s:literal) => {
        concat!(turndown_domain!(), ".", $s)
    };
}

// Node pool tag keys
pub const PREVIOUS_CAPACITY_TAG_KEY: &str = turndown_domain!("previous"); // Holds the capacity marker of a turned down pool.

// Singleton turndown pool
pub const TURNDOWN_POOL_NAME: &str = "cluster-turndown";
pub const TURNDOWN_POOL_INSTANCE_TYPE: &str = "t2.small";
pub const TURNDOWN_POOL_DISK_TYPE: &str = "gp2";
pub const TURNDOWN_POOL_DISK_SIZE_GB: i32 = 10;
pub const TURNDOWN_POOL_NODE_COUNT: i32 = 1;

// Label keys
pub const LABEL_TURNDOWN_NODE: &str = "cluster-turndown-node"; // Identifies nodes of the singleton pool.
pub const LABEL_TURNDOWN_NODE_VALUE: &str = "true";
