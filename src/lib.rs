pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod itad;
pub mod predict;
pub mod prices;
pub mod sync;
pub mod types;

/// Embedded migrations, shared by the binary and the integration tests.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
