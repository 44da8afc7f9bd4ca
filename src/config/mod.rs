//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling {} seeds with {} workers", config.seeds.len(), config.crawler.max_workers);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BackoffConfig, Config, CrawlerConfig, ImageConfig, OutputConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate_seeds;
