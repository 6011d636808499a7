use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("Could not create directory {0}")]
    CreateDir(String),

    #[error("Failed to launch {0}: {1}")]
    Launch(String, String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("I/O error: {0}")]
    Io(String),
}
