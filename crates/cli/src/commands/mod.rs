//! Subcommand implementations

pub mod alert;
pub mod replicas;
pub mod status;
