pub mod client;
pub mod config;
pub mod errors;
pub mod launch_policy;
pub mod logging;
pub mod metrics;
pub mod outcome;
pub mod plan;
pub mod report;
pub mod scheduler;
pub mod utils;
pub mod workload;
pub mod yaml_config;
