pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod output;
pub mod planner;
pub mod retrieval;
pub mod stats;
