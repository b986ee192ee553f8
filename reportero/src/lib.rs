pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod protocol;
pub mod transport;
