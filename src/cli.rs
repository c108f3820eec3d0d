use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Resumable multi-connection downloader", long_about = None)]
pub struct Args {
    /// URLs to download (if given, --tasks-file is ignored)
    #[arg(index = 1)]
    pub urls: Vec<String>,

    /// File with one URL per line, optionally followed by `|save-name`
    #[arg(short = 't', long = "tasks-file")]
    pub tasks_file: Option<PathBuf>,

    /// Directory to save downloaded files
    #[arg(short = 'd', long = "download-dir")]
    pub download_dir: Option<PathBuf>,

    /// File name to save a single URL as
    #[arg(short = 'o', long = "output")]
    pub output: Option<String>,

    /// Maximum number of files downloading at once (defaults to number of logical CPUs)
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Global rate limit in bytes per second (e.g., 1048576 for 1MB/s)
    #[arg(short = 'r', long)]
    pub rate_limit: Option<u32>,

    /// Maximum number of chunks per file
    #[arg(short = 's', long)]
    pub split: Option<usize>,

    /// Extra attempts for each failed request
    #[arg(long)]
    pub retries: Option<u32>,

    /// JSON engine configuration; command-line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List unfinished and finished downloads recorded in the download directory
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_urls() {
        let args = Args::parse_from([
            "rdl", "-s", "8", "-d", "out", "--retries", "5", "http://a/x", "http://b/y",
        ]);
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.split, Some(8));
        assert_eq!(args.retries, Some(5));
        assert_eq!(args.download_dir, Some(PathBuf::from("out")));
        assert!(!args.list);
    }
}
