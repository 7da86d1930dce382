//! Migration services.

pub mod harbor_client;
pub mod helm;
pub mod inventory;
pub mod migration;
pub mod transfer;
pub mod version_gate;
