use std::path::{Path, PathBuf};

use crate::domain::Backend;

/// A fully resolved backend invocation. Built fresh per request, never
/// reused.
#[derive(Debug, Clone)]
pub struct EffectiveCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub sudo_password: Option<String>,
}

impl EffectiveCommand {
    /// Command line rendered for log output, without the credential.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Arguments shared by all backend builders.
pub struct CommandSpec<'a> {
    pub url: &'a str,
    pub output_path: Option<&'a Path>,
    pub cwd: &'a Path,
    pub sudo_password: Option<&'a str>,
    pub threads: u32,
    pub check_ssl: bool,
}

/// Builds the exact invocation for the given backend. Pure: no I/O happens
/// here, only argv construction.
pub fn build(backend: Backend, spec: &CommandSpec<'_>) -> EffectiveCommand {
    match backend {
        Backend::Aria2 => aria2c_command(spec),
        Backend::Axel => axel_command(spec),
        Backend::Wget => wget_command(spec),
    }
}

fn aria2c_command(spec: &CommandSpec<'_>) -> EffectiveCommand {
    let mut args: Vec<String> = vec![
        spec.url.to_string(),
        "--no-conf".to_string(),
        "-x".to_string(),
        "16".to_string(),
        "--enable-color=false".to_string(),
        "--stderr=true".to_string(),
        "--summary-interval=0".to_string(),
        "--disable-ipv6".to_string(),
        "-k".to_string(),
        "1M".to_string(),
        "--allow-overwrite=true".to_string(),
        "-c".to_string(),
        "-t".to_string(),
        "5".to_string(),
        "--max-file-not-found=3".to_string(),
        "--file-allocation=none".to_string(),
        "--console-log-level=error".to_string(),
    ];

    if spec.threads > 1 {
        args.push("-s".to_string());
        args.push(spec.threads.to_string());
    }

    if let Some(output_path) = spec.output_path {
        // aria2c takes the directory and the file name separately
        let dir = output_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = output_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        args.push("-d".to_string());
        args.push(dir.to_string_lossy().into_owned());
        args.push("-o".to_string());
        args.push(name);
    }

    command(Backend::Aria2, args, spec)
}

fn axel_command(spec: &CommandSpec<'_>) -> EffectiveCommand {
    let mut args: Vec<String> = vec![
        spec.url.to_string(),
        "-n".to_string(),
        spec.threads.to_string(),
        "-4".to_string(),
        "-c".to_string(),
        "-T".to_string(),
        "5".to_string(),
    ];

    if !spec.check_ssl {
        args.push("-k".to_string());
    }

    if let Some(output_path) = spec.output_path {
        args.push(format!("--output={}", output_path.display()));
    }

    command(Backend::Axel, args, spec)
}

fn wget_command(spec: &CommandSpec<'_>) -> EffectiveCommand {
    // The fallback runs a single connection; the computed thread count is
    // intentionally ignored
    let mut args: Vec<String> = vec![
        spec.url.to_string(),
        "-c".to_string(),
        "--retry-connrefused".to_string(),
        "-t".to_string(),
        "10".to_string(),
        "--no-config".to_string(),
        "-nc".to_string(),
    ];

    if !spec.check_ssl {
        args.push("--no-check-certificate".to_string());
    }

    if let Some(output_path) = spec.output_path {
        args.push("-O".to_string());
        args.push(output_path.to_string_lossy().into_owned());
    }

    command(Backend::Wget, args, spec)
}

fn command(backend: Backend, args: Vec<String>, spec: &CommandSpec<'_>) -> EffectiveCommand {
    EffectiveCommand {
        program: backend.executable().to_string(),
        args,
        cwd: spec.cwd.to_path_buf(),
        sudo_password: spec.sudo_password.map(str::to_string),
    }
}
