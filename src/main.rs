use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use adaptive_downloader::{
    Backend, DownloadRequest, DownloadSupervisor, DownloaderConfig, Messages, ProgressSink,
};

#[derive(Parser)]
#[command(name = "adaptive-downloader")]
#[command(about = "Downloads a file with aria2c, axel or wget, whichever fits best")]
#[command(version)]
struct Cli {
    /// URL to download
    url: String,

    /// Where to write the file (defaults to the tool's own naming in the
    /// working directory)
    #[arg(short, long)]
    output: Option<std::path::PathBuf>,

    /// Working directory for the backend process
    #[arg(long)]
    cwd: Option<std::path::PathBuf>,

    /// Force this backend instead of picking by priority
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Connection count override (0 keeps the size-based choice)
    #[arg(short, long)]
    threads: Option<u32>,

    /// File size in bytes, when already known, to skip the probe
    #[arg(long)]
    size: Option<u64>,

    /// Disable multi-connection tools and always use the fallback
    #[arg(long)]
    single_connection: bool,

    /// Skip TLS certificate validation in the backend
    #[arg(long)]
    no_check_certificate: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

/// Sink that renders progress on stdout, with the bold markup stripped.
struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn change_substatus(&self, text: &str) {
        println!("{}", strip_markup(text));
    }

    fn print(&self, text: &str) {
        println!("{}", strip_markup(text));
    }
}

fn strip_markup(text: &str) -> String {
    text.replace("<b>", "").replace("</b>", "")
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = DownloaderConfig {
        multithread_enabled: !cli.single_connection,
        preferred_backend: cli.backend,
        check_ssl: !cli.no_check_certificate,
    };
    let supervisor = DownloadSupervisor::new(config, Messages::default());

    if !supervisor.catalog().can_operate() {
        eprintln!("no download tool found: install aria2c, axel or wget");
        return ExitCode::FAILURE;
    }

    let mut request = DownloadRequest::new(&cli.url);
    if let Some(output) = cli.output {
        request = request.output_path(output);
    }
    if let Some(cwd) = cli.cwd {
        request = request.cwd(cwd);
    }
    if let Some(threads) = cli.threads {
        request = request.max_threads(threads);
    }
    if let Some(size) = cli.size {
        request = request.known_size(size);
    }

    let sink = (!cli.quiet).then(|| Arc::new(ConsoleSink) as Arc<dyn ProgressSink>);

    if supervisor.download(&request, sink).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<b>[aria2]</b> Downloading <b>app.bin</b>"),
            "[aria2] Downloading app.bin"
        );
    }
}
