use anyhow::{bail, Context, Result};
use chrono::Local;
use futures::StreamExt;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use rdl_engine::{store, DownloadEngine, EngineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::cli::Args;

#[derive(Clone, Debug, PartialEq)]
pub struct DownloadTask {
    pub url: String,
    pub save_name: String,
}

/// Config file (if any), then command-line overrides.
pub async fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?,
        None => EngineConfig::default(),
    };

    if let Some(dir) = &args.download_dir {
        config.default_save_path = dir.clone();
    }
    if config.default_save_path.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            config.default_save_path = cwd.join(&config.default_save_path);
        }
    }
    if let Some(split) = args.split {
        config.max_threads = split;
    }
    if let Some(retries) = args.retries {
        config.max_retry_count = retries;
    }
    if args.rate_limit.is_some() {
        config.rate_limit = args.rate_limit;
    }
    Ok(config)
}

pub fn parse_task_line(line: &str) -> Option<DownloadTask> {
    let raw = line.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let mut parts = raw.splitn(2, '|');
    let url = parts.next().unwrap_or_default().trim().to_string();
    let save_name = parts.next().map(|n| n.trim().to_string()).unwrap_or_default();
    if url.is_empty() {
        return None;
    }
    Some(DownloadTask { url, save_name })
}

pub async fn collect_tasks(args: &Args) -> Result<Vec<DownloadTask>> {
    if !args.urls.is_empty() {
        if args.output.is_some() && args.urls.len() > 1 {
            bail!("--output can only be used with a single URL");
        }
        let save_name = args.output.clone().unwrap_or_default();
        return Ok(args
            .urls
            .iter()
            .map(|url| DownloadTask {
                url: url.clone(),
                save_name: save_name.clone(),
            })
            .collect());
    }

    let Some(input) = &args.tasks_file else {
        bail!("Nothing to download: pass URLs or --tasks-file");
    };
    let file = fs::File::open(input)
        .await
        .context(format!("Failed to open input file: {:?}", input))?;
    let mut lines = BufReader::new(file).lines();
    let mut tasks = vec![];
    while let Some(line) = lines.next_line().await? {
        if let Some(task) = parse_task_line(&line) {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} {bytes_per_sec:>12} {eta:>4} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

pub async fn run_downloads(config: EngineConfig, tasks: Vec<DownloadTask>, concurrency: Option<usize>) -> Result<()> {
    let save_path = config.default_save_path.clone();
    let engine = Arc::new(DownloadEngine::with_reqwest(config).context("Failed to build HTTP client")?);

    let multi_progress = MultiProgress::new();
    multi_progress.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

    let shutdown = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping downloads; progress is kept for resume");
            shutdown.shutdown();
        }
    });

    let concurrency = concurrency.unwrap_or_else(num_cpus::get).max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = vec![];

    for task in tasks {
        let engine = engine.clone();
        let semaphore = semaphore.clone();
        let save_path = save_path.clone();
        let pb = multi_progress.add(ProgressBar::new(0));
        pb.set_style(bar_style());
        pb.set_message(format!("Waiting     {}", task.url));

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            download_one(&engine, &task, save_path, pb).await
        }));
    }

    let mut failed = 0;
    for handle in handles {
        if let Err(e) = handle.await? {
            error!("{:#}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} download(s) failed", failed);
    }
    Ok(())
}

async fn download_one(engine: &DownloadEngine, task: &DownloadTask, save_path: PathBuf, pb: ProgressBar) -> Result<()> {
    let mut stream = engine
        .start_download(&task.url, &task.save_name, Some(save_path))
        .with_context(|| format!("Failed to start {}", task.url))?;
    pb.set_message(format!("Downloading {}", task.url));

    while let Some(item) = stream.next().await {
        match item {
            Ok(status) => {
                if !status.chunked {
                    pb.set_length(status.total_length);
                }
                pb.set_position(status.downloaded_length);
            }
            Err(e) => {
                pb.abandon_with_message(format!("Failed      {}", task.url));
                return Err(e).with_context(|| format!("Failed to download {}", task.url));
            }
        }
    }

    pb.finish_with_message(format!("Completed   {}", task.url));
    Ok(())
}

pub async fn list_downloads(output: &Path) -> Result<()> {
    if !output.exists() {
        println!("Output directory '{:?}' does not exist.", output);
        println!("Tip: If you used a custom output directory, please specify it with --download-dir");
        return Ok(());
    }

    let records = store::list(output).await.context("Failed to read download records")?;
    if records.is_empty() {
        println!("No recorded downloads found in '{:?}'.", output);
        return Ok(());
    }

    println!("{:<40} {:<12} {:<10} {:<12} {:<17}", "Filename", "Status", "Progress", "Size", "Updated");
    println!("{:-<40} {:-<12} {:-<10} {:-<12} {:-<17}", "", "", "", "", "");

    for record in records {
        let total = record.content_length.unwrap_or(0);
        let (status, progress) = if record.completed {
            ("Completed", 100.0)
        } else if total > 0 {
            ("Partial", (record.downloaded() as f64 / total as f64) * 100.0)
        } else {
            ("Partial", 0.0)
        };
        let updated = record.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");

        println!(
            "{:<40} {:<12} {:<10} {:<12} {:<17}",
            record.save_name,
            status,
            format!("{:.2}%", progress),
            format!("{}", HumanBytes(total)),
            updated.to_string()
        );
    }
    Ok(())
}
