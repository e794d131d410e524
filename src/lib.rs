// Public API for the binary, integration tests and library usage

pub mod api;
pub mod broadcast;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod types;
