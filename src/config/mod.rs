//! Configuration module for Crawl-Warden
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_warden::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("warden.toml")).unwrap();
//! println!("Minimum account health: {}", config.pool.min_health);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CircuitBreakerConfig, Config, PoolConfig, ProxyConfig, ProxyEndpoint, StorageConfig,
    SyncConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
