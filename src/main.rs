mod cancel;
mod client;
mod config;
mod error;
mod exporter;
mod http;
mod perf;
mod portal;
mod storage;
mod tasks;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cancel::cancel_pair;
use crate::exporter::ExportReport;

#[derive(Parser)]
#[command(name = "portalsync")]
#[command(about = "Export Apigee Edge developer portals to local JSON files", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Extra config file, applied over the global and project files
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export all portal sites of the source org
    Export {
        /// Export directory [default: export.dest]
        #[arg(short, long, value_name = "DIR")]
        dest: Option<PathBuf>,

        /// Cap on in-flight portal requests, 0 for unbounded
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,

        /// Exit non-zero if any resource failed to export
        #[arg(long)]
        strict: bool,
    },

    /// Import exported portals into the destination org (not supported)
    Import {
        /// Directory produced by `export` [default: export.dest]
        #[arg(short, long, value_name = "DIR")]
        src: Option<PathBuf>,
    },

    /// Delete all portals in the destination org (not supported)
    Delete,
}

fn init_tracing(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,portalsync={}", level)));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

fn print_summary(report: &ExportReport, dest: &std::path::Path) {
    println!(
        "exported {} site(s), {} file(s) to {}",
        report.sites,
        report.files_written,
        dest.display()
    );
    if !report.skipped.is_empty() {
        eprintln!(
            "warning: {} binary asset(s) listed but not downloaded",
            report.skipped.len()
        );
    }
    for failure in &report.failures {
        eprintln!("warning: {}", failure);
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let mut config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Export {
            dest,
            max_concurrency,
            strict,
        } => {
            if let Some(dest) = dest {
                config.export.dest = dest;
            }
            if let Some(n) = max_concurrency {
                config.export.max_concurrency = n;
            }
            config.export.strict |= strict;

            let (handle, signal) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted, cancelling export");
                    handle.cancel();
                }
            });

            let report = tasks::export_portals(&config, signal).await?;
            print_summary(&report, &config.export.dest);

            if config.export.strict && !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Import { src } => {
            let src = src.unwrap_or_else(|| config.export.dest.clone());
            tasks::import_all_portals(&config, &src)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Delete => {
            tasks::delete_all_portals(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
