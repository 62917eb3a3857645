//! Replacing the HTML root block of a managed page file
//!
//! A managed file holds at most one meaningful HTML root; only the first
//! matching block is ever targeted. When no block is found, or when the
//! substitution changes nothing, the whole file is overwritten with the
//! payload rather than silently doing nothing.

use crate::error::PatchError;
use crate::extract::HtmlPayload;
use crate::report::Report;
use fs2::FileExt;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

/// Which write policy fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStrategy {
    /// The first existing HTML root block was replaced in place.
    ReplacedRoot,
    /// No block found, or replacement was a no-op; the whole file now
    /// holds exactly the payload.
    Overwrote,
}

impl PatchStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            PatchStrategy::ReplacedRoot => "replaced existing block",
            PatchStrategy::Overwrote => "overwrote whole file",
        }
    }
}

/// Result of a successful apply: the policy that fired and the exact
/// content now on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub strategy: PatchStrategy,
    pub content: String,
}

/// Locates and replaces the HTML root block of a target file.
pub struct Patcher {
    doctype_block: Regex,
    html_block: Regex,
    lock_target: bool,
}

impl Default for Patcher {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Patcher {
    pub fn new(lock_target: bool) -> Self {
        Self {
            doctype_block: Regex::new(r"(?is)<!DOCTYPE html>.*?</html>")
                .unwrap_or_else(|err| panic!("invalid doctype pattern: {err}")),
            html_block: Regex::new(r"(?is)<html[^>]*>.*?</html>")
                .unwrap_or_else(|err| panic!("invalid html pattern: {err}")),
            lock_target,
        }
    }

    /// Merge `payload` into the file at `target`, recording every decision.
    pub fn apply(
        &self,
        payload: &HtmlPayload,
        target: &Path,
        report: &mut Report,
    ) -> Result<PatchOutcome, PatchError> {
        let ops_started = Instant::now();

        if !target.exists() {
            report.add_step("target file check", false, format!("missing: {}", target.display()));
            return Err(PatchError::FileMissing(target.to_path_buf()));
        }
        report.add_step("target file check", true, format!("exists: {}", target.display()));

        let _lock = if self.lock_target {
            match TargetLock::acquire(target) {
                Ok(lock) => {
                    report.add_step("target lock", true, "advisory lock acquired");
                    Some(lock)
                }
                Err(err) => {
                    report.add_step("target lock", false, err.to_string());
                    return Err(PatchError::Lock {
                        path: target.to_path_buf(),
                        source: err,
                    });
                }
            }
        } else {
            None
        };

        let existing = match fs::read_to_string(target) {
            Ok(content) => {
                report.add_step(
                    "read target",
                    true,
                    format!("length {}", content.chars().count()),
                );
                content
            }
            Err(err) => {
                report.add_step("read target", false, err.to_string());
                return Err(PatchError::Read {
                    path: target.to_path_buf(),
                    source: err,
                });
            }
        };

        let (new_content, strategy) = self.merge(payload, &existing, report);

        // The existence check above implies a parent, but the caller may
        // hand over paths whose directories were cleaned up concurrently.
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(err) = fs::create_dir_all(parent) {
                    report.add_step("create parent directory", false, err.to_string());
                    return Err(PatchError::Write {
                        path: target.to_path_buf(),
                        source: err,
                    });
                }
                report.add_step(
                    "create parent directory",
                    true,
                    format!("created: {}", parent.display()),
                );
            }
        }

        report.record_file_operations_duration(ops_started.elapsed().as_secs_f64());

        let write_started = Instant::now();
        if let Err(err) = write_atomic(target, &new_content) {
            report.add_step("write target", false, err.to_string());
            return Err(PatchError::Write {
                path: target.to_path_buf(),
                source: err,
            });
        }
        let write_duration = write_started.elapsed().as_secs_f64();
        report.record_file_write_duration(write_duration);
        report.add_timed_step(
            "write target",
            true,
            format!("wrote {} bytes ({})", new_content.len(), strategy.label()),
            write_duration,
        );

        Ok(PatchOutcome {
            strategy,
            content: new_content,
        })
    }

    /// Substitute the first HTML root block, or fall back to the payload
    /// alone. Everything before and after a replaced block is preserved
    /// byte-for-byte.
    fn merge(
        &self,
        payload: &HtmlPayload,
        existing: &str,
        report: &mut Report,
    ) -> (String, PatchStrategy) {
        let span = self
            .doctype_block
            .find(existing)
            .or_else(|| self.html_block.find(existing));

        let Some(span) = span else {
            report.add_step(
                "replace html block",
                false,
                "no html root block in target, overwriting whole file",
            );
            return (payload.as_str().to_string(), PatchStrategy::Overwrote);
        };

        let span_len = span.end() - span.start();
        let mut replaced =
            String::with_capacity(existing.len() - span_len + payload.len());
        replaced.push_str(&existing[..span.start()]);
        replaced.push_str(payload.as_str());
        replaced.push_str(&existing[span.end()..]);

        if replaced == existing {
            // No-op substitution: treat it as a pattern miss and overwrite.
            report.add_step(
                "replace html block",
                false,
                "substitution was a no-op, overwriting whole file",
            );
            return (payload.as_str().to_string(), PatchStrategy::Overwrote);
        }

        report.add_step(
            "replace html block",
            true,
            format!("span {}..{} replaced", span.start(), span.end()),
        );
        (replaced, PatchStrategy::ReplacedRoot)
    }
}

/// Write through a temp file in the same directory so an interrupted write
/// never leaves a truncated target.
#[cfg(unix)]
fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    fs::write(path, content)
}

/// RAII advisory lock on a sidecar of the target path.
struct TargetLock {
    file: std::fs::File,
    lock_path: PathBuf,
}

impl TargetLock {
    fn acquire(target: &Path) -> io::Result<Self> {
        let lock_path = sidecar_lock_path(target);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Lock file content doesn't matter, just the lock
            .open(&lock_path)?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err);
                    }
                    if started.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) {
                        return Err(io::Error::new(
                            ErrorKind::TimedOut,
                            format!("timed out waiting for page lock ({}s)", LOCK_TIMEOUT_SECS),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
                }
            }
        }

        Ok(Self { file, lock_path })
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn sidecar_lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    name.push_str(".lock");
    target.with_file_name(name)
}
