use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sitepub::config::config_path;
use sitepub::{Config, Environment, PublishOptions, publish};

#[derive(Parser)]
#[command(name = "sitepub", version, about = "Publish changed site files over FTP or SFTP")]
struct Cli {
    /// The environment the site should be published to
    environment: Environment,

    /// Ignore the stored publish marker and republish everything
    #[arg(long)]
    force: bool,

    /// List the files that would be published without connecting
    #[arg(long)]
    dry_run: bool,

    /// Project root to publish
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Config file (default: SITEPUB_CONFIG or <root>/sitepub.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    println!("=== Starting '{}' release ===", cli.environment);
    if let Err(err) = run(&cli) {
        eprintln!("error: {err:#}");
        println!("=== FAILED ===");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let path = config_path(&cli.root, cli.config.as_deref());
    let config = Config::load_with_env(&path)?;
    tracing::debug!(config = %path.display(), protocol = %config.protocol, "loaded config");

    let report = publish(
        &PublishOptions {
            environment: cli.environment,
            root: cli.root.clone(),
            force: cli.force,
            dry_run: cli.dry_run,
            config_file: Some(path.clone()),
        },
        &config,
    )?;

    if cli.dry_run {
        for file in &report.files {
            println!("-> {file}");
        }
        println!("=== DRY RUN: {} file(s) ===", report.files.len());
    } else {
        tracing::info!(uploaded = report.uploaded, "publish finished");
        println!("=== DONE ===");
    }
    Ok(())
}
