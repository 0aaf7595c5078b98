pub mod api;
pub mod config;
pub mod handler;
pub mod health;
pub mod kafka;
pub mod metrics;
