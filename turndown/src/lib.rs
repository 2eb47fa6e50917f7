pub mod config;
pub mod error;
mod provider;

pub use crate::config::TurndownConfig;
pub use crate::provider::{PendingRestore, TurndownProvider};
