//! Rebind CLI
//!
//! Runs the hot-reload demonstration and reports what happened to each
//! binding and instance.

use anyhow::{bail, Context};
use clap::Parser;
use rebind::config::ReloadConfig;
use rebind::demo;
use rebind::VERSION;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rebind")]
#[command(author, version, about = "Hot module reloading with live instance re-binding", long_about = None)]
struct Cli {
    /// JSON reload configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ReloadConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ReloadConfig::default(),
    };

    println!("rebind {}", VERSION);
    let outcome = demo::run(&config).context("demonstration failed")?;

    println!("before reload:");
    println!("  StandardClass    {:?}", outcome.standard_before);
    println!("  SomeDynamicClass {:?}", outcome.dynamic_before);
    println!("after reload:");
    println!("  StandardClass    {:?}", outcome.standard_after);
    println!("  SomeDynamicClass {:?}", outcome.dynamic_after);
    if let Some(result) = &outcome.dynamic_foo {
        println!("  dynamic_instance.foo() -> {}", result);
    }
    println!(
        "reloaded {:?}, rebound {:?}, migrated {} instance(s)",
        outcome.report.reloaded, outcome.report.rebound, outcome.report.migrated_instances
    );

    if !outcome.matches_expectations() {
        bail!("reload did not behave as expected");
    }
    Ok(())
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
