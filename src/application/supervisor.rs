use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::api::SizeProbe;
use crate::backend::catalog::BackendCatalog;
use crate::backend::command::{self, CommandSpec, EffectiveCommand};
use crate::domain::{
    Backend, DownloadError, DownloadOutcome, DownloadRequest, DownloaderConfig, Messages,
};
use crate::utils;

use super::progress::{bold, ProgressSink};
use super::threads::effective_thread_count;

/// Runs an external backend process to completion. A seam so the supervisor
/// can be exercised without real downloads.
pub trait ProcessLauncher: Send + Sync {
    fn run(
        &self,
        command: EffectiveCommand,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> BoxFuture<'static, Result<bool, DownloadError>>;
}

/// Real launcher backed by `tokio::process`. Backend output lines are
/// forwarded to the sink while the transfer runs.
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn run(
        &self,
        command: EffectiveCommand,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> BoxFuture<'static, Result<bool, DownloadError>> {
        Box::pin(async move {
            let mut process = if command.sudo_password.is_some() {
                let mut process = Command::new("sudo");
                process
                    .arg("-S")
                    .arg("-p")
                    .arg("")
                    .arg(&command.program)
                    .args(&command.args);
                process.stdin(Stdio::piped());
                process
            } else {
                let mut process = Command::new(&command.program);
                process.args(&command.args);
                process.stdin(Stdio::null());
                process
            };

            process
                .current_dir(&command.cwd)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = process
                .spawn()
                .map_err(|err| DownloadError::Launch(command.program.clone(), err.to_string()))?;

            if let Some(password) = &command.sudo_password {
                if let Some(mut stdin) = child.stdin.take() {
                    // dropping stdin closes the pipe after the password
                    let _ = stdin.write_all(format!("{password}\n").as_bytes()).await;
                }
            }

            let stderr_task = child.stderr.take().map(|stderr| {
                let sink = sink.clone();
                tokio::spawn(async move { forward_lines(stderr, sink).await })
            });

            if let Some(stdout) = child.stdout.take() {
                forward_lines(stdout, sink).await;
            }

            let status = child
                .wait()
                .await
                .map_err(|err| DownloadError::Process(err.to_string()))?;

            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            Ok(status.success())
        })
    }
}

async fn forward_lines<R>(reader: R, sink: Option<Arc<dyn ProgressSink>>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match &sink {
            Some(sink) => sink.print(&line),
            None => log::debug!("{line}"),
        }
    }
}

/// Orchestrates one download: resolves the backend, derives the connection
/// count, launches the external process under supervision and guarantees
/// that a failed attempt leaves no partial file behind.
pub struct DownloadSupervisor {
    config: DownloaderConfig,
    messages: Messages,
    catalog: BackendCatalog,
    probe: Arc<SizeProbe>,
    launcher: Arc<dyn ProcessLauncher>,
}

impl DownloadSupervisor {
    pub fn new(config: DownloaderConfig, messages: Messages) -> Self {
        Self {
            config,
            messages,
            catalog: BackendCatalog::new(),
            probe: Arc::new(SizeProbe::new()),
            launcher: Arc::new(TokioLauncher),
        }
    }

    pub fn with_catalog(mut self, catalog: BackendCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn catalog(&self) -> &BackendCatalog {
        &self.catalog
    }

    /// Downloads `request.url`, reporting progress text to `sink` when one
    /// is given. Returns true iff the backend process reported success.
    ///
    /// Every failure mode collapses to the boolean: nothing above this call
    /// ever sees an error value.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> bool {
        self.execute(request, sink).await.success
    }

    /// Same as [`download`](Self::download), but also reports the elapsed
    /// wall-clock time.
    pub async fn execute(
        &self,
        request: &DownloadRequest,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> DownloadOutcome {
        log::info!("Downloading {}", request.url);
        let started = Instant::now();
        let cwd = request.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
        let file_name = utils::file_name_from_url(&request.url);

        let mut cleanup = true;
        let success = match self.run(request, &cwd, &file_name, sink.as_ref()).await {
            Ok(finished) => finished,
            Err(DownloadError::CreateDir(_)) => {
                // nothing was launched, so there is nothing to remove
                cleanup = false;
                false
            }
            Err(err) => {
                log::error!("Download of '{file_name}' raised an error: {err}");
                false
            }
        };

        if !success {
            log::error!("Could not download '{file_name}'");
            if cleanup {
                self.remove_partial(request, &cwd, &file_name).await;
            }
        }

        let elapsed = started.elapsed();
        log::info!(
            "{file_name} download took {:.2} minutes",
            elapsed.as_secs_f64() / 60.0
        );

        DownloadOutcome { success, elapsed }
    }

    async fn run(
        &self,
        request: &DownloadRequest,
        cwd: &Path,
        file_name: &str,
        sink: Option<&Arc<dyn ProgressSink>>,
    ) -> Result<bool, DownloadError> {
        self.prepare_output(request, sink).await?;

        let backend = self
            .catalog
            .resolve(self.config.preferred_backend, self.config.multithread_enabled)
            .unwrap_or(Backend::Wget);
        let threads = effective_thread_count(request.max_threads, request.known_size);

        let command = command::build(
            backend,
            &CommandSpec {
                url: &request.url,
                output_path: request.output_path.as_deref(),
                cwd,
                sudo_password: request.sudo_password.as_deref(),
                threads,
                check_ssl: self.config.check_ssl,
            },
        );
        log::debug!("Launching: {}", command.display_line());

        if let Some(sink) = sink {
            self.announce(request, backend, file_name, sink);
        }

        self.launcher.run(command, sink.cloned()).await
    }

    /// Removes a stale file at the output path, or makes sure the parent
    /// directory exists. A directory that cannot be created is fatal for
    /// the request.
    async fn prepare_output(
        &self,
        request: &DownloadRequest,
        sink: Option<&Arc<dyn ProgressSink>>,
    ) -> Result<(), DownloadError> {
        let Some(output_path) = &request.output_path else {
            return Ok(());
        };

        if output_path.exists() {
            log::info!(
                "Removing old file found before downloading: {}",
                output_path.display()
            );
            tokio::fs::remove_file(output_path)
                .await
                .map_err(|err| DownloadError::Io(err.to_string()))?;
            log::info!("Old file {} removed", output_path.display());
        } else if let Some(dir) = output_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            if let Err(err) = tokio::fs::create_dir_all(dir).await {
                let dir = dir.to_string_lossy();
                log::error!("Could not make download directory '{dir}': {err}");
                if let Some(sink) = sink {
                    sink.print(&self.messages.mkdir_error_for(&dir));
                }
                return Err(DownloadError::CreateDir(dir.into_owned()));
            }
        }

        Ok(())
    }

    /// Composes the substatus line and, when the size is unknown, spawns the
    /// fire-and-forget probe task that fills it in. The task is never joined
    /// and never affects the outcome of the transfer.
    fn announce(
        &self,
        request: &DownloadRequest,
        backend: Backend,
        file_name: &str,
        sink: &Arc<dyn ProgressSink>,
    ) {
        let mut display_name = file_name.to_string();
        if let Some(output_path) = &request.output_path {
            if !utils::has_extension(&display_name) {
                if let Some(name) = output_path.file_name().and_then(|name| name.to_str()) {
                    if utils::has_extension(name) {
                        display_name = name.to_string();
                    }
                }
            }
        }

        let mut message = String::new();
        if let Some(prefix) = &request.substatus_prefix {
            message.push_str(prefix);
            message.push(' ');
        }
        message.push_str(&bold(&format!("[{}]", backend.label())));
        message.push(' ');
        message.push_str(&self.messages.downloading);
        message.push(' ');
        message.push_str(&bold(&display_name));

        if !request.display_file_size {
            message.push_str(" ( ? Mb )");
            sink.change_substatus(&message);
            return;
        }

        match request.known_size {
            Some(size) => {
                message.push_str(&format!(" ( {} )", utils::human_size_str(size)));
                sink.change_substatus(&message);
            }
            None => {
                let probe = Arc::clone(&self.probe);
                let sink = Arc::clone(sink);
                let url = request.url.clone();
                tokio::spawn(async move {
                    sink.change_substatus(&format!("{message} ( ? Mb )"));
                    if let Some(size) = probe.probe_length(&url).await {
                        sink.change_substatus(&format!(
                            "{message} ( {} )",
                            utils::human_size_str(size)
                        ));
                    }
                });
            }
        }
    }

    /// Best-effort removal of whatever the failed attempt left behind. Its
    /// own failure is logged and swallowed; it never changes the outcome.
    async fn remove_partial(&self, request: &DownloadRequest, cwd: &Path, file_name: &str) {
        let target = request
            .output_path
            .clone()
            .unwrap_or_else(|| cwd.join(file_name));

        match tokio::fs::try_exists(&target).await {
            Ok(true) => {}
            _ => return,
        }

        log::info!("Removing downloaded file {}", target.display());

        let removed = if request.sudo_password.is_some() {
            // an elevated download leaves a root-owned artifact behind
            let rm = EffectiveCommand {
                program: "rm".to_string(),
                args: vec!["-rf".to_string(), target.to_string_lossy().into_owned()],
                cwd: cwd.to_path_buf(),
                sudo_password: request.sudo_password.clone(),
            };
            self.launcher.run(rm, None).await.map(|_| ())
        } else {
            tokio::fs::remove_file(&target)
                .await
                .map_err(|err| DownloadError::Io(err.to_string()))
        };

        if let Err(err) = removed {
            log::warn!(
                "Could not remove partial download {}: {err}",
                target.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::catalog::ExecutableLookup;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    struct StubLookup(HashSet<&'static str>);

    impl ExecutableLookup for StubLookup {
        fn locate(&self, name: &str) -> Option<PathBuf> {
            self.0
                .contains(name)
                .then(|| PathBuf::from("/usr/bin").join(name))
        }
    }

    fn catalog_with(present: &[&'static str]) -> BackendCatalog {
        BackendCatalog::with_lookup(Box::new(StubLookup(present.iter().copied().collect())))
    }

    #[derive(Default)]
    struct RecordingSink {
        substatus: Mutex<Vec<String>>,
        printed: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn change_substatus(&self, text: &str) {
            self.substatus.lock().unwrap().push(text.to_string());
        }

        fn print(&self, text: &str) {
            self.printed.lock().unwrap().push(text.to_string());
        }
    }

    /// Fake backend process: optionally writes bytes at a path before
    /// reporting the scripted exit result.
    struct ScriptedLauncher {
        succeed: bool,
        write_path: Option<PathBuf>,
        commands: Mutex<Vec<EffectiveCommand>>,
        target_existed_at_launch: Mutex<Option<bool>>,
    }

    impl ScriptedLauncher {
        fn new(succeed: bool) -> Self {
            Self {
                succeed,
                write_path: None,
                commands: Mutex::new(Vec::new()),
                target_existed_at_launch: Mutex::new(None),
            }
        }

        fn writing(succeed: bool, path: &Path) -> Self {
            let mut launcher = Self::new(succeed);
            launcher.write_path = Some(path.to_path_buf());
            launcher
        }
    }

    impl ProcessLauncher for ScriptedLauncher {
        fn run(
            &self,
            command: EffectiveCommand,
            _sink: Option<Arc<dyn ProgressSink>>,
        ) -> BoxFuture<'static, Result<bool, DownloadError>> {
            if let Some(path) = &self.write_path {
                *self.target_existed_at_launch.lock().unwrap() = Some(path.exists());
                std::fs::write(path, b"partial-bytes").unwrap();
            }
            self.commands.lock().unwrap().push(command);
            let succeed = self.succeed;
            Box::pin(async move { Ok(succeed) })
        }
    }

    fn supervisor(launcher: Arc<dyn ProcessLauncher>, tools: &[&'static str]) -> DownloadSupervisor {
        DownloadSupervisor::new(DownloaderConfig::default(), Messages::default())
            .with_catalog(catalog_with(tools))
            .with_launcher(launcher)
    }

    #[tokio::test]
    async fn test_stale_file_removed_before_launch() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");
        std::fs::write(&output, b"stale").unwrap();

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher.clone(), &["wget"]);
        let request = DownloadRequest::new("https://example.com/app.bin").output_path(&output);

        assert!(supervisor.download(&request, None).await);
        assert_eq!(
            *launcher.target_existed_at_launch.lock().unwrap(),
            Some(false)
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"partial-bytes");
    }

    #[tokio::test]
    async fn test_unwritable_output_directory_fails_before_launch() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let output = blocker.join("sub").join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::new(true));
        let supervisor = supervisor(launcher.clone(), &["wget"]);
        let sink = Arc::new(RecordingSink::default());
        let request = DownloadRequest::new("https://example.com/app.bin").output_path(&output);

        let ok = supervisor
            .download(&request, Some(sink.clone() as Arc<dyn ProgressSink>))
            .await;

        assert!(!ok);
        assert!(launcher.commands.lock().unwrap().is_empty());
        let printed = sink.printed.lock().unwrap();
        assert!(printed.iter().any(|line| line.contains("blocker")));
    }

    #[tokio::test]
    async fn test_successful_process_leaves_file_in_place() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let request = DownloadRequest::new("https://example.com/app.bin").output_path(&output);

        assert!(supervisor.download(&request, None).await);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_failed_process_removes_partial_artifact() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(false, &output));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let request = DownloadRequest::new("https://example.com/app.bin").output_path(&output);

        assert!(!supervisor.download(&request, None).await);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_failed_process_removes_url_named_artifact_in_cwd() {
        let dir = tempdir().unwrap();
        let implied = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(false, &implied));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let request = DownloadRequest::new("https://example.com/app.bin").cwd(dir.path());

        assert!(!supervisor.download(&request, None).await);
        assert!(!implied.exists());
    }

    #[tokio::test]
    async fn test_failed_probe_leaves_placeholder_and_download_succeeds() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let sink = Arc::new(RecordingSink::default());
        // port 9 (discard) is closed, so the probe yields nothing
        let request = DownloadRequest::new("http://127.0.0.1:9/app.bin").output_path(&output);

        let ok = supervisor
            .download(&request, Some(sink.clone() as Arc<dyn ProgressSink>))
            .await;
        assert!(ok);

        // give the fire-and-forget probe task a moment to settle
        tokio::time::sleep(Duration::from_millis(300)).await;
        let substatus = sink.substatus.lock().unwrap();
        assert_eq!(substatus.len(), 1);
        assert_eq!(
            substatus[0],
            "<b>[aria2]</b> Downloading <b>app.bin</b> ( ? Mb )"
        );
    }

    #[tokio::test]
    async fn test_known_size_is_shown_immediately() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let sink = Arc::new(RecordingSink::default());
        let request = DownloadRequest::new("https://example.com/app.bin")
            .output_path(&output)
            .substatus_prefix("1/3")
            .known_size(5_000_000);

        assert!(
            supervisor
                .download(&request, Some(sink.clone() as Arc<dyn ProgressSink>))
                .await
        );

        let substatus = sink.substatus.lock().unwrap();
        assert_eq!(
            substatus.as_slice(),
            ["1/3 <b>[aria2]</b> Downloading <b>app.bin</b> ( 5.00 Mb )"]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_wget_when_no_multithreaded_tool_exists() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher.clone(), &["wget"]);
        let request = DownloadRequest::new("https://example.com/app.bin").output_path(&output);

        assert!(supervisor.download(&request, None).await);
        let commands = launcher.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].program, "wget");
    }

    #[tokio::test]
    async fn test_prefers_aria2c_when_available() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher.clone(), &["aria2c", "axel", "wget"]);
        let request = DownloadRequest::new("https://example.com/app.bin").output_path(&output);

        assert!(supervisor.download(&request, None).await);
        let commands = launcher.commands.lock().unwrap();
        assert_eq!(commands[0].program, "aria2c");
    }

    #[tokio::test]
    async fn test_hidden_size_shows_placeholder_without_probing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.bin");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let sink = Arc::new(RecordingSink::default());
        let request = DownloadRequest::new("https://example.com/app.bin")
            .output_path(&output)
            .display_file_size(false);

        assert!(
            supervisor
                .download(&request, Some(sink.clone() as Arc<dyn ProgressSink>))
                .await
        );

        let substatus = sink.substatus.lock().unwrap();
        assert_eq!(
            substatus.as_slice(),
            ["<b>[aria2]</b> Downloading <b>app.bin</b> ( ? Mb )"]
        );
    }

    #[tokio::test]
    async fn test_display_name_borrows_extension_from_output_path() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("app.tar.xz");

        let launcher = Arc::new(ScriptedLauncher::writing(true, &output));
        let supervisor = supervisor(launcher, &["aria2c"]);
        let sink = Arc::new(RecordingSink::default());
        // URL tail has no extension, the output path does
        let request = DownloadRequest::new("https://example.com/download/latest")
            .output_path(&output)
            .known_size(1_000_000);

        assert!(
            supervisor
                .download(&request, Some(sink.clone() as Arc<dyn ProgressSink>))
                .await
        );

        let substatus = sink.substatus.lock().unwrap();
        assert!(substatus[0].contains("<b>app.tar.xz</b>"));
    }
}
