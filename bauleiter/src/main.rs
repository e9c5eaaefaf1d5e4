//! Bauleiter - build matrix orchestration for Debian source packages
//!
//! Usage:
//!   bauleiter [-c config.yml] build-pkg-condor [--env F C]... [--arch A...] pkg.dsc
//!   bauleiter [-c config.yml] genpkgs [--pkgdb db.json] [-D dest]

use bauleiter::commands::{Cli, Commands, build_pkg_condor, genpkgs};
use bauleiter::config::Config;
use clap::Parser;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_TARGETS: [&str; 3] = ["bauleiter", "convenient_dsc", "convenient_condor"];

fn main() {
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let cli = Cli::parse_from(&argv);

    let level = if cli.debug { "debug" } else { "info" };
    let default_filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli, &argv) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(cli: Cli, argv: &[String]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load(&cli.config)?;
    for source in config.sources() {
        tracing::debug!("Configuration from {}", source.display());
    }

    match cli.command {
        Commands::BuildPkgCondor(args) => build_pkg_condor::execute(&config, args, argv),
        Commands::Genpkgs { pkgdb, dest_dir } => genpkgs::execute(&config, pkgdb, &dest_dir),
    }
}
