pub mod auth;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod schedule;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
