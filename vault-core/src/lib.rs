pub mod backup_store;
pub mod config;
pub mod constants;
pub mod database;
pub mod drive;
pub mod error;
pub mod restore;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use error::{Result, VaultError};
