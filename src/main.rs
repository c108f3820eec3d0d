mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Args;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let config = commands::load_config(&args).await?;

        if args.list {
            return commands::list_downloads(&config.default_save_path).await;
        }

        let tasks = commands::collect_tasks(&args).await?;
        commands::run_downloads(config, tasks, args.concurrency).await
    })
}
