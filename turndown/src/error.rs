use models::nodepool::ProviderError;

use snafu::Snafu;
use std::time::Duration;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to list node pools: '{}'", source))]
    ListNodePools { source: ProviderError },

    #[snafu(display("Unable to create node pool '{}': '{}'", pool, source))]
    CreateNodePool { pool: String, source: ProviderError },

    #[snafu(display("Unable to resize node pool '{}' to {}: '{}'", pool, size, source))]
    UpdateNodePoolSize {
        pool: String,
        size: i32,
        source: ProviderError,
    },

    #[snafu(display("Unable to tag node pool '{}': '{}'", pool, source))]
    CreateOrUpdateTags { pool: String, source: ProviderError },

    #[snafu(display("Unable to delete tags from node pool '{}': '{}'", pool, source))]
    DeleteTags { pool: String, source: ProviderError },

    #[snafu(display("Timed out after {:?} while trying to {}", timeout, operation))]
    BatchTimeout {
        operation: String,
        timeout: Duration,
        source: tokio::time::error::Elapsed,
    },

    #[snafu(display(
        "Could not parse environment variable '{}={}': '{}'",
        variable,
        value,
        source
    ))]
    ConfigEnv {
        variable: String,
        value: String,
        source: std::num::ParseIntError,
    },

    #[snafu(display("Invalid turndown configuration: '{}'", source))]
    InvalidConfig { source: validator::ValidationErrors },
}
