//! RangeCache Common - Shared types and utilities
//!
//! This crate provides the key type and meta key codec, range descriptors,
//! the shared error type and configuration used by the range descriptor
//! cache and its tooling.

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

pub use config::{CacheConfig, ClusterConfig, Config, LoggingConfig};
pub use error::{Error, Result};
pub use keys::{
    KEY_MAX, KEY_MIN, Key, META1_KEY_MAX, META1_PREFIX, META2_KEY_MAX, META2_PREFIX,
    MetaLevel, meta_key_target, meta_level, range_meta_key,
};
pub use types::*;
