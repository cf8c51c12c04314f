//! Alertmanager-driven scale webhook for a single compose service

pub mod api;
pub mod app;
pub mod config;

pub use app::Webhook;
