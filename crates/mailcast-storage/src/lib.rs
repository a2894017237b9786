//! Mailcast Storage - PostgreSQL persistence
//!
//! Models, repositories and embedded migrations for users' campaigns,
//! contacts, brands, templates, sender addresses and send records.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
