pub mod progress;
pub mod supervisor;
pub mod threads;

pub use progress::ProgressSink;
pub use supervisor::{DownloadSupervisor, ProcessLauncher, TokioLauncher};
pub use threads::effective_thread_count;
