use anyhow::Context;
use std::path::Path;
use universe_core::{io, paths, AppCatalog, RuntimeConfig};

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing universe in: {}", root.display());

    let config_path = paths::config_path(root);
    let yaml = config_template(&RuntimeConfig::default())?;
    if io::write_if_missing(&config_path, yaml.as_bytes())
        .with_context(|| format!("failed to write {}", config_path.display()))?
    {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    let apps_dir = paths::apps_dir(root);
    let catalog = AppCatalog::builtin();
    let written = catalog
        .save_dir(&apps_dir, false)
        .context("failed to write app definitions")?;
    for name in catalog.names() {
        let status = if written.iter().any(|w| w == name) {
            "created:"
        } else {
            "exists: "
        };
        println!(
            "  {status} {}/{}/{}",
            paths::APPS_DIR,
            paths::app_dir_name(name),
            paths::DEFINITION_FILE
        );
    }
    Ok(())
}

fn config_template(config: &RuntimeConfig) -> anyhow::Result<String> {
    let mut out = String::from("# Synthetic app universe runtime settings\n");
    out.push_str(&config.to_yaml().context("failed to serialize config")?);
    Ok(out)
}
