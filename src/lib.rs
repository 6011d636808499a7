//! Adaptive file-download orchestrator.
//!
//! Transfers are delegated to whichever external tool the host offers:
//! `aria2c` and `axel` split a download across several connections, `wget`
//! is the always-works fallback. The library picks the tool, derives the
//! connection count from the file size, supervises the process and cleans
//! up after failed attempts.

pub mod api;
pub mod application;
pub mod backend;
pub mod domain;
pub mod utils;

pub use api::SizeProbe;
pub use application::{DownloadSupervisor, ProcessLauncher, ProgressSink, TokioLauncher};
pub use backend::BackendCatalog;
pub use domain::{
    Backend, DownloadError, DownloadOutcome, DownloadRequest, DownloaderConfig, Messages,
};
