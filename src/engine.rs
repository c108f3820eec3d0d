use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info, info_span, Instrument};

use crate::config::EngineConfig;
use crate::error::{DownloadError, Result};
use crate::limit::ByteLimiter;
use crate::paths::resolve_save_name;
use crate::registry::Registry;
use crate::retry::RetryPolicy;
use crate::session::Session;
use crate::status::DownloadStatus;
use crate::strategy::{self, Strategy};
use crate::transport::{ReqwestTransport, Transport};

/// Entry point: one engine owns one registry, so a URL downloads at most once at a time
/// through it.
pub struct DownloadEngine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    limiter: Option<Arc<ByteLimiter>>,
    shutdown: CancellationToken,
}

impl DownloadEngine {
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let limiter = ByteLimiter::from_limit(config.rate_limit).map(Arc::new);
        Self {
            config,
            transport,
            registry: Arc::new(Registry::new()),
            limiter,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_reqwest(config: EngineConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Cancels every running download.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Starts downloading `url` into `save_path/save_name`.
    ///
    /// An empty `save_name` is derived from the URL; `None` for `save_path` uses the
    /// configured default. Fails at once if the URL is already downloading. Must be
    /// called inside a Tokio runtime.
    pub fn start_download(
        &self,
        url: &str,
        save_name: &str,
        save_path: Option<PathBuf>,
    ) -> Result<DownloadStream> {
        let save_name = resolve_save_name(url, save_name)?;
        let save_path = save_path.unwrap_or_else(|| self.config.default_save_path.clone());
        let record = self.registry.admit(url, &save_name, save_path.clone())?;
        let admission = Admission {
            registry: self.registry.clone(),
            url: url.to_string(),
        };

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let token = self.shutdown.child_token();
        let session = Session {
            url: url.to_string(),
            transport: self.transport.clone(),
            record,
            retry: RetryPolicy::from(&self.config),
            token: token.clone(),
            limiter: self.limiter.clone(),
            max_threads: self.config.max_threads.max(1),
            read_timeout: self.config.read_timeout(),
            tx: tx.clone(),
        };

        let span = info_span!("download", url = %url, name = %save_name);
        tokio::spawn(
            async move {
                let result = run(&session, save_path).await;
                drop(session);
                // Release before the terminal item so a caller who saw the stream end
                // can start the same URL again.
                drop(admission);

                if let Err(err) = result {
                    report(&err);
                    let _ = tx.send(Err(err)).await;
                }
            }
            .instrument(span),
        );

        Ok(DownloadStream {
            rx,
            token: token.clone(),
            _guard: token.drop_guard(),
        })
    }
}

async fn run(session: &Session, save_path: PathBuf) -> Result<Strategy> {
    fs::create_dir_all(&save_path).await?;

    let strategy = tokio::select! {
        _ = session.token.cancelled() => return Err(DownloadError::Cancelled),
        strategy = strategy::classify(session) => strategy?,
    };
    info!(strategy = strategy.name(), "Starting download");

    strategy.prepare(session).await?;
    strategy.execute(session).await?;
    Ok(strategy)
}

fn report(err: &DownloadError) {
    if err.is_cancelled() {
        info!("Download cancelled");
        return;
    }
    let leaves = err.flatten();
    if leaves.len() > 1 {
        for (i, leaf) in leaves.iter().enumerate() {
            error!(error = %leaf, "Failure {} of {}", i + 1, leaves.len());
        }
    }
    error!(error = %err, "Download failed");
}

/// Removes the URL from the registry however the pipeline ends, panics included.
struct Admission {
    registry: Arc<Registry>,
    url: String,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.registry.release(&self.url);
    }
}

/// Status updates of one download. Ends after the final status on success; a failure
/// arrives as the last item. Dropping the stream cancels the download.
pub struct DownloadStream {
    rx: mpsc::Receiver<Result<DownloadStatus>>,
    token: CancellationToken,
    _guard: DropGuard,
}

impl DownloadStream {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Drains the stream, returning the last status or the failure.
    pub async fn wait(mut self) -> Result<DownloadStatus> {
        let mut last = DownloadStatus::default();
        while let Some(item) = self.rx.recv().await {
            last = item?;
        }
        Ok(last)
    }
}

impl Stream for DownloadStream {
    type Item = Result<DownloadStatus>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
