//! treesync - in-memory mirror of a watched workspace tree
//!
//! Module layout:
//! - models: paths, the flat entry store, the derived tree and tabs
//! - kernel: the synchronizer, its reconciler and watch registry
//! - kernel::services: provider contract, disk/memory providers, settings

pub mod kernel;
pub mod models;
