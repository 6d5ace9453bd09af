pub mod config;
pub mod directory;
pub mod events;
pub mod filter;
pub mod latency;
pub mod registry;
pub mod service;
