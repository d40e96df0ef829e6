pub mod app;
pub mod config;
pub mod liveness;
pub mod position;
pub mod scheduler;
pub mod store;
pub mod tracking;
pub mod upload;
