use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// External download tools the orchestrator knows how to drive.
///
/// The set is fixed at compile time; only the availability of each
/// executable on the host varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Aria2,
    Axel,
    Wget,
}

impl Backend {
    /// Name of the executable looked up on the PATH.
    pub fn executable(&self) -> &'static str {
        match self {
            Self::Aria2 => "aria2c",
            Self::Axel => "axel",
            Self::Wget => "wget",
        }
    }

    /// Short name shown in substatus text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Aria2 => "aria2",
            Self::Axel => "axel",
            Self::Wget => "wget",
        }
    }

    /// Whether the tool can split one transfer across several connections.
    pub fn multi_connection(&self) -> bool {
        !matches!(self, Self::Wget)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aria2" | "aria2c" => Ok(Self::Aria2),
            "axel" => Ok(Self::Axel),
            "wget" => Ok(Self::Wget),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// One download to perform. Owned by the caller and read-only to the core.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_path: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub sudo_password: Option<String>,
    pub substatus_prefix: Option<String>,
    pub display_file_size: bool,
    pub max_threads: Option<u32>,
    pub known_size: Option<u64>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_path: None,
            cwd: None,
            sudo_password: None,
            substatus_prefix: None,
            display_file_size: true,
            max_threads: None,
            known_size: None,
        }
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(password.into());
        self
    }

    pub fn substatus_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.substatus_prefix = Some(prefix.into());
        self
    }

    pub fn display_file_size(mut self, display: bool) -> Self {
        self.display_file_size = display;
        self
    }

    pub fn max_threads(mut self, threads: u32) -> Self {
        self.max_threads = Some(threads);
        self
    }

    pub fn known_size(mut self, size: u64) -> Self {
        self.known_size = Some(size);
        self
    }
}

/// Terminal result of one download attempt.
#[derive(Debug, Clone, Copy)]
pub struct DownloadOutcome {
    pub success: bool,
    pub elapsed: Duration,
}

/// Orchestrator settings, built once at process start and passed around
/// immutably.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub multithread_enabled: bool,
    pub preferred_backend: Option<Backend>,
    pub check_ssl: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            multithread_enabled: true,
            preferred_backend: None,
            check_ssl: true,
        }
    }
}

/// Human-readable strings used in sink output. The surrounding application
/// supplies translated text; these defaults are plain English.
#[derive(Debug, Clone)]
pub struct Messages {
    pub downloading: String,
    /// Template for the directory-creation error; `{dir}` is substituted.
    pub mkdir_error: String,
}

impl Messages {
    pub fn mkdir_error_for(&self, dir: &str) -> String {
        self.mkdir_error.replace("{dir}", dir)
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            downloading: "Downloading".to_string(),
            mkdir_error: "It was not possible to create the directory {dir}".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("aria2".parse::<Backend>().unwrap(), Backend::Aria2);
        assert_eq!("aria2c".parse::<Backend>().unwrap(), Backend::Aria2);
        assert_eq!("AXEL".parse::<Backend>().unwrap(), Backend::Axel);
        assert!("curl".parse::<Backend>().is_err());
    }

    #[test]
    fn test_multi_connection_flags() {
        assert!(Backend::Aria2.multi_connection());
        assert!(Backend::Axel.multi_connection());
        assert!(!Backend::Wget.multi_connection());
    }

    #[test]
    fn test_mkdir_error_template() {
        let messages = Messages::default();
        let text = messages.mkdir_error_for("/tmp/downloads");
        assert!(text.contains("/tmp/downloads"));
        assert!(!text.contains("{dir}"));
    }
}
