use crate::output::{print_json, print_table};
use clap::Subcommand;
use std::path::Path;
use universe_core::AppCategory;

#[derive(Subcommand)]
pub enum AppsSubcommand {
    /// List loaded apps
    List {
        /// Only apps in this category (e.g. email, productivity)
        #[arg(long)]
        category: Option<AppCategory>,
    },

    /// Show an app's actions, limits and schemas
    Show { name: String },
}

pub fn run(root: &Path, subcmd: AppsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AppsSubcommand::List { category } => list(root, category, json),
        AppsSubcommand::Show { name } => show(root, &name, json),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(root: &Path, category: Option<AppCategory>, json: bool) -> anyhow::Result<()> {
    let catalog = super::load_catalog(root)?;
    let apps: Vec<_> = catalog
        .apps()
        .filter(|a| category.map_or(true, |c| a.metadata.category == c))
        .collect();

    if json {
        let value: Vec<_> = apps
            .iter()
            .map(|a| {
                serde_json::json!({
                    "name": a.name(),
                    "category": a.metadata.category,
                    "actions": a.actions.len(),
                    "rate_limits": a.rate_limits,
                })
            })
            .collect();
        return print_json(&value);
    }

    if apps.is_empty() {
        println!("No apps.");
        return Ok(());
    }
    let rows = apps
        .iter()
        .map(|a| {
            vec![
                a.name().to_string(),
                a.metadata.category.to_string(),
                a.actions.len().to_string(),
                format!(
                    "{}/min, burst {}",
                    a.rate_limits.requests_per_min, a.rate_limits.burst_limit
                ),
            ]
        })
        .collect();
    print_table(&["NAME", "CATEGORY", "ACTIONS", "RATE LIMIT"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let catalog = super::load_catalog(root)?;
    let app = catalog.require(name)?;

    if json {
        return print_json(app);
    }

    println!("{} v{} ({})", app.name(), app.version, app.metadata.category);
    if !app.metadata.description.is_empty() {
        println!("{}", app.metadata.description);
    }
    println!(
        "Rate limit: {}/min, burst {}",
        app.rate_limits.requests_per_min, app.rate_limits.burst_limit
    );
    println!();

    let rows = app
        .actions
        .iter()
        .map(|a| {
            let required = a.inputs_schema["required"]
                .as_array()
                .map(|r| {
                    r.iter()
                        .filter_map(|v| v.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            vec![
                a.name.clone(),
                format!("{}-{}ms", a.latency_range_ms.0, a.latency_range_ms.1),
                if required.is_empty() { "-".to_string() } else { required },
                a.side_effects.join(", "),
            ]
        })
        .collect();
    print_table(&["ACTION", "LATENCY", "REQUIRED", "SIDE EFFECTS"], rows);
    Ok(())
}
