pub mod error;
pub mod model;

pub use error::DownloadError;
pub use model::{
    Backend, DownloadOutcome, DownloadRequest, DownloaderConfig, Messages,
};
