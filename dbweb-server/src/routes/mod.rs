//! Route handlers organized by resource

pub mod connection;
pub mod health;
pub mod info;
pub mod metrics;
