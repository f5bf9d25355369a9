//! nodee — per-node service runner with a chore-keeping RAM-overload
//! supervisor.

pub mod app;
pub mod keeper;
mod local_logger;
mod prelude;
pub mod service;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
