use crate::output::{envelope_line, print_json};
use anyhow::Context;
use serde_json::Value;
use std::path::Path;
use universe_core::Runtime;

pub struct ExecArgs {
    pub app: String,
    pub action: String,
    pub input: Option<String>,
    pub seed: Option<u64>,
    pub chaos: Option<f64>,
    pub repeat: u32,
}

/// Execute one action, optionally several times against the same runtime
/// so rate limits and state carry over between calls.
pub fn run(root: &Path, args: ExecArgs, json: bool) -> anyhow::Result<()> {
    let inputs: Value = match args.input.as_deref() {
        Some(raw) => serde_json::from_str(raw).context("--input is not valid JSON")?,
        None => Value::Object(Default::default()),
    };

    let catalog = super::load_catalog(root)?;
    let app = catalog.require(&args.app)?;
    let config = super::with_overrides(super::load_config(root)?, args.seed, args.chaos);
    config.ensure_valid()?;

    let runtime = Runtime::from_config(&config);
    runtime.attach(app);

    let envelopes = super::block_on(async {
        let mut out = Vec::with_capacity(args.repeat as usize);
        for _ in 0..args.repeat.max(1) {
            out.push(runtime.execute_action(app, &args.action, inputs.clone()).await);
        }
        out
    })?;

    if json {
        if let [single] = envelopes.as_slice() {
            print_json(single)?;
        } else {
            print_json(&envelopes)?;
        }
    } else {
        for env in &envelopes {
            println!("{}", envelope_line(env));
            if let Some(result) = &env.result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }
    }

    if let [only] = envelopes.as_slice() {
        if !only.success {
            anyhow::bail!(
                "action '{}' failed: {}",
                args.action,
                only.error_type().unwrap_or("unknown")
            );
        }
    }
    Ok(())
}
