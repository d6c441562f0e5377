//! Core reconciliation logic for SeedHub.
//!
//! This crate turns raw seed manifests into normalized records, validates and
//! de-duplicates them, builds the registry index, and persists it as an
//! artifact and a patched hub document (e.g., `reconcile`).

pub mod artifact;
pub mod dedupe;
pub mod index;
pub mod merge;
pub mod normalize;
pub mod patch;
pub mod pipeline;
pub mod validate;

#[cfg(test)]
mod testing;
