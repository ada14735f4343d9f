// Capability checks for external binaries
//
// Resolution is a PATH lookup plus the usual install dirs. Results are
// cached for a bounded interval and then re-checked, so installing or
// removing a tool is noticed without a restart. Callers spawn the path the
// lookup resolved, never the bare program name.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::process::Command as TokioCommand;

/// Fallback locations checked after PATH (Homebrew and system installs)
const COMMON_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

pub const DEFAULT_PROBE_TTL: Duration = Duration::from_secs(60);

/// Upper bound for a `with_check` command
const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub path: Option<String>,
    pub available: bool,
}

#[derive(Debug)]
struct Cached {
    checked_at: Instant,
    resolved: Option<PathBuf>,
}

/// Lazily resolves a program and caches the answer for `ttl`
#[derive(Debug)]
pub struct BinaryProbe {
    program: String,
    /// Extra check run once the binary resolves, e.g. `-c "import yt_dlp"`
    check_args: Option<Vec<String>>,
    search_dirs: Vec<PathBuf>,
    ttl: Duration,
    /// Only ever locked for a read or a store, never across an await
    cache: Mutex<Option<Cached>>,
    /// One refresh at a time; concurrent callers wait for its result
    refresh: tokio::sync::Mutex<()>,
}

impl BinaryProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            check_args: None,
            search_dirs: COMMON_DIRS.iter().map(PathBuf::from).collect(),
            ttl: DEFAULT_PROBE_TTL,
            cache: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Also require `program <args>` to exit successfully
    pub fn with_check(mut self, args: Vec<String>) -> Self {
        self.check_args = Some(args);
        self
    }

    /// Directories searched after PATH
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn is_available(&self) -> bool {
        self.resolve().await.is_some()
    }

    /// Resolved absolute path, if the program is installed
    pub async fn resolve(&self) -> Option<PathBuf> {
        if let Some(hit) = self.fresh() {
            return hit;
        }

        let _refreshing = self.refresh.lock().await;
        // Someone else may have refreshed while we waited
        if let Some(hit) = self.fresh() {
            return hit;
        }

        let resolved = self.lookup().await;
        if resolved.is_none() {
            tracing::debug!(program = %self.program, "program not resolvable");
        }
        *self.cache.lock() = Some(Cached {
            checked_at: Instant::now(),
            resolved: resolved.clone(),
        });
        resolved
    }

    fn fresh(&self) -> Option<Option<PathBuf>> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|cached| cached.checked_at.elapsed() < self.ttl)
            .map(|cached| cached.resolved.clone())
    }

    async fn lookup(&self) -> Option<PathBuf> {
        let program = self.program.clone();
        let dirs = self.search_dirs.clone();
        let found = tokio::task::spawn_blocking(move || find_program(&program, &dirs))
            .await
            .ok()
            .flatten()?;

        match &self.check_args {
            None => Some(found),
            Some(args) => self.passes_check(&found, args).await.then_some(found),
        }
    }

    async fn passes_check(&self, path: &Path, args: &[String]) -> bool {
        let status = TokioCommand::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(CHECK_TIMEOUT, status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::debug!(program = %self.program, error = %e, "availability check failed to run");
                false
            }
            Err(_) => {
                tracing::warn!(program = %self.program, "availability check timed out");
                false
            }
        }
    }

    pub async fn info(&self, name: &str) -> ToolInfo {
        let path = self.resolve().await;
        ToolInfo {
            name: name.to_string(),
            available: path.is_some(),
            path: path.map(|p| p.display().to_string()),
        }
    }
}

/// Look a program up the way a shell would: explicit paths as-is, bare
/// names through PATH and then `extra_dirs`
fn find_program(program: &str, extra_dirs: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let from_path = env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    from_path
        .into_iter()
        .chain(extra_dirs.iter().cloned())
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

#[cfg(test)]
pub(crate) fn write_executable(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
