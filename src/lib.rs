// Library exports for the binary and integration tests

#![recursion_limit = "256"]

pub mod analysis;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod manager;
pub mod notifier;
pub mod pipeline;
pub mod server;
pub mod shutdown;
pub mod types;
pub mod watcher;
