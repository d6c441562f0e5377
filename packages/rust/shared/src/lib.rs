//! Shared types, error model, and configuration for SeedHub.
//!
//! This crate is the foundation depended on by all other SeedHub crates.
//! It provides:
//! - [`HubError`]: the unified error type
//! - Domain types ([`Record`], [`ModuleRow`], [`RegistryIndex`], [`ValidationProblem`])
//! - Configuration ([`HubConfig`], config loading)
//! - The [`ManifestSource`] seam implemented by the GitHub transport

pub mod config;
pub mod error;
pub mod source;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    GitHubConfig, HubConfig, HubSection, ManifestPaths, MergeConfig, OutputsConfig,
    SourcesConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{HubError, Result};
pub use source::ManifestSource;
pub use types::{
    ManifestCounts, ManifestKind, ModuleRow, Record, RegistryIndex, RepoRef, ValidationProblem,
};
