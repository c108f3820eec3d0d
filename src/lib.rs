//! Resumable, multi-connection HTTP downloads.
//!
//! [`DownloadEngine::start_download`] checks the server, picks a [`Strategy`] and
//! streams [`DownloadStatus`] updates. Chunked downloads persist their offsets next to
//! the output file, so an interrupted transfer continues where it stopped as long as
//! the server reports the resource unchanged.

pub mod checks;
pub mod config;
pub mod engine;
pub mod error;
pub mod limit;
pub mod multi;
pub mod paths;
pub mod range;
pub mod record;
pub mod registry;
pub mod retry;
pub mod session;
pub mod single;
pub mod status;
pub mod store;
pub mod strategy;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{DownloadEngine, DownloadStream};
pub use error::{DownloadError, Result};
pub use range::DownloadRange;
pub use record::TemporaryRecord;
pub use registry::Registry;
pub use status::DownloadStatus;
pub use strategy::Strategy;
pub use transport::{HttpResponse, ReqwestTransport, Transport};
