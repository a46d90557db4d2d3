//! Core types shared across Stepwise.
//!
//! Currently this is the configuration layer: TOML files, environment
//! overrides and the defaults the rest of the crate builds on.

mod config;

pub use config::{
    BackendConfig, Config, MirrorConfig, WorkspaceConfig, ENV_BACKEND_URL, ENV_WORKSPACE_ROOT,
};
