pub mod constants;
pub mod nodepool;
pub mod telemetry;
