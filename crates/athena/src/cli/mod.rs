//! Subcommand implementations.

pub mod config;
pub mod prepare;
pub mod token;

use anyhow::Context;
use athena_core::Config;
use std::path::{Path, PathBuf};

/// Load the config named by `--config`, or the default one.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let path = expand_path(path);
            Config::load_from(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(Config::load()?),
    }
}

/// Expand `~` and `$VAR` in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
