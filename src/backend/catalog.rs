use std::path::{Path, PathBuf};

use crate::domain::Backend;

/// Multi-connection candidates, in priority order.
const MULTI_CONNECTION: [Backend; 2] = [Backend::Aria2, Backend::Axel];

/// Host-side executable discovery. A seam so catalog policy can be tested
/// against a fake host.
pub trait ExecutableLookup: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// "which"-style lookup scanning the PATH environment variable.
pub struct PathLookup;

impl ExecutableLookup for PathLookup {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let path_env = std::env::var("PATH").ok()?;
        let separator = if cfg!(windows) { ';' } else { ':' };

        for dir in path_env.split(separator) {
            if dir.is_empty() {
                continue;
            }

            let mut candidate = PathBuf::from(dir).join(name);
            if cfg!(windows) && !name.ends_with(".exe") {
                candidate.set_extension("exe");
            }

            if is_executable(&candidate) {
                return Some(candidate);
            }
        }

        None
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.is_file() && (metadata.permissions().mode() & 0o111) != 0
    }

    #[cfg(not(unix))]
    {
        metadata.is_file()
    }
}

/// Knows which backends exist and which are usable on the current host.
///
/// Availability is never cached: every call re-probes the PATH so the answer
/// reflects the live host state.
pub struct BackendCatalog {
    lookup: Box<dyn ExecutableLookup>,
}

impl Default for BackendCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendCatalog {
    pub fn new() -> Self {
        Self::with_lookup(Box::new(PathLookup))
    }

    pub fn with_lookup(lookup: Box<dyn ExecutableLookup>) -> Self {
        Self { lookup }
    }

    pub fn is_available(&self, backend: Backend) -> bool {
        self.lookup.locate(backend.executable()).is_some()
    }

    /// Multi-connection backends present on this host, in catalog order.
    pub fn available_backends(&self) -> Vec<Backend> {
        MULTI_CONNECTION
            .into_iter()
            .filter(|backend| self.is_available(*backend))
            .collect()
    }

    /// Picks the multi-connection backend to use, or `None` when the
    /// single-connection fallback must handle the transfer.
    ///
    /// A preferred backend is honored when it is recognized and installed;
    /// otherwise the candidates are scanned in priority order. Preferring
    /// the fallback tool counts as an unrecognized preference.
    pub fn resolve(
        &self,
        preferred: Option<Backend>,
        multithread_enabled: bool,
    ) -> Option<Backend> {
        if !multithread_enabled {
            return None;
        }

        match preferred.filter(|backend| backend.multi_connection()) {
            None => MULTI_CONNECTION
                .into_iter()
                .find(|backend| self.is_available(*backend)),
            Some(preference) => {
                if self.is_available(preference) {
                    return Some(preference);
                }

                MULTI_CONNECTION
                    .into_iter()
                    .filter(|backend| *backend != preference)
                    .find(|backend| self.is_available(*backend))
            }
        }
    }

    /// True when at least one tool, fallback included, can perform a
    /// download on this host.
    pub fn can_operate(&self) -> bool {
        self.is_available(Backend::Wget) || !self.available_backends().is_empty()
    }
}
