//! Object-detection dashboard: cookie-based JWT sessions in front of a
//! detection aggregation loop and the views derived from it.
pub mod api;
pub mod auth;
pub mod cli;
pub mod conf;
pub mod cv;
pub mod export;
pub mod pipeline;
pub mod stats;
pub mod store;
