//! # Adgate
//!
//! Access control and campaign governance for a multi-tenant advertising service: linked
//! platform credentials, the advertiser account hierarchy, per-tenant permission grants,
//! access decisions and sequential campaign approvals, each change recorded in an audit ledger.

pub mod access;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod platform;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod token_vault;
pub mod workflow;
pub use migration;
