pub mod api;
pub mod cache;
pub mod config;
pub mod consumer;
pub mod ingest;
pub mod models;
pub mod schema;
pub mod store;
pub mod warmup;
