mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{apps::AppsSubcommand, config::ConfigSubcommand, exec::ExecArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "universe",
    about = "Synthetic SaaS app runtime: execute actions against flaky simulated backends",
    version,
    propagate_version = true
)]
struct Cli {
    /// Universe root (default: nearest directory with universe.yaml)
    #[arg(long, global = true, env = "UNIVERSE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write universe.yaml and the built-in app definitions
    Init,

    /// Inspect loaded apps
    Apps {
        #[command(subcommand)]
        subcommand: AppsSubcommand,
    },

    /// Execute an action and print the result envelope
    Exec {
        app: String,
        action: String,
        /// Action inputs as a JSON object
        #[arg(long, short = 'i')]
        input: Option<String>,
        /// Seed for fault and latency draws
        #[arg(long)]
        seed: Option<u64>,
        /// Chaos level, 0.0 to 2.0
        #[arg(long)]
        chaos: Option<f64>,
        /// Run the call this many times against the same runtime
        #[arg(long, default_value = "1")]
        repeat: u32,
    },

    /// Run a scripted session across the built-in apps
    Demo {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        chaos: Option<f64>,
    },

    /// Inspect and validate universe.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Apps { subcommand } => cmd::apps::run(&root, subcommand, cli.json),
        Commands::Exec {
            app,
            action,
            input,
            seed,
            chaos,
            repeat,
        } => cmd::exec::run(
            &root,
            ExecArgs {
                app,
                action,
                input,
                seed,
                chaos,
                repeat,
            },
            cli.json,
        ),
        Commands::Demo { seed, chaos } => cmd::demo::run(&root, seed, chaos, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
