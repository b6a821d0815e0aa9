pub mod apps;
pub mod config;
pub mod demo;
pub mod exec;
pub mod init;

use anyhow::Context;
use std::future::Future;
use std::path::Path;
use universe_core::{paths, AppCatalog, RuntimeConfig};

/// `<root>/universe.yaml`, or the defaults when it does not exist.
pub fn load_config(root: &Path) -> anyhow::Result<RuntimeConfig> {
    let path = paths::config_path(root);
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }
    RuntimeConfig::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

/// Apps under `<root>/apps/`, or the built-in examples when there are none.
pub fn load_catalog(root: &Path) -> anyhow::Result<AppCatalog> {
    let dir = paths::apps_dir(root);
    let catalog = AppCatalog::load_dir(&dir)
        .with_context(|| format!("failed to load apps from {}", dir.display()))?;
    if catalog.is_empty() {
        tracing::debug!("no app definitions on disk, using built-in apps");
        return Ok(AppCatalog::builtin());
    }
    Ok(catalog)
}

/// Apply `--seed` / `--chaos` flags on top of the loaded config.
pub fn with_overrides(
    mut config: RuntimeConfig,
    seed: Option<u64>,
    chaos: Option<f64>,
) -> RuntimeConfig {
    if seed.is_some() {
        config.chaos.seed = seed;
    }
    if let Some(level) = chaos {
        config.chaos.level = level;
    }
    config
}

pub fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    Ok(rt.block_on(fut))
}
