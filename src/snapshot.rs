//! First-seen content snapshots for managed pages
//!
//! The orchestration layer owns this state; the engine stays stateless.
//! A snapshot is captured before a page's first modification, and restore
//! replays the captured document through the normal apply path so the same
//! replacement and reporting rules hold.

use crate::engine::Engine;
use crate::error::ApplyError;
use crate::patch::PatchOutcome;
use crate::report::Report;
use crate::util::hash_str;
use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct SnapshotStore {
    initial: HashMap<PathBuf, String>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the file's current content unless a snapshot already exists.
    /// Returns whether a new snapshot was taken.
    pub fn capture_if_absent(&mut self, path: &Path) -> anyhow::Result<bool> {
        if self.initial.contains_key(path) {
            return Ok(false);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {} for snapshot", path.display()))?;
        self.initial.insert(path.to_path_buf(), content);
        Ok(true)
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.initial.get(path).map(String::as_str)
    }

    /// Whether the file on disk currently differs from its snapshot.
    pub fn is_dirty(&self, path: &Path) -> anyhow::Result<bool> {
        let snapshot = self
            .initial
            .get(path)
            .with_context(|| format!("no snapshot recorded for {}", path.display()))?;
        let current = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(hash_str(&current) != hash_str(snapshot))
    }

    /// Re-apply the captured document to the file it came from. Returns
    /// `None` when no snapshot was recorded for the path.
    pub fn restore(
        &self,
        engine: &Engine,
        path: &Path,
    ) -> Option<(Result<PatchOutcome, ApplyError>, Report)> {
        let initial = self.initial.get(path)?;
        Some(engine.apply_response(initial, path))
    }

    pub fn forget(&mut self, path: &Path) -> Option<String> {
        self.initial.remove(path)
    }

    pub fn len(&self) -> usize {
        self.initial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineOptions;
    use tempfile::TempDir;

    const FIRST: &str = "<!DOCTYPE html><html><body>First</body></html>";
    const SECOND: &str = "<!DOCTYPE html><html><body>Second</body></html>";

    fn engine_in(dir: &TempDir) -> Engine {
        Engine::new(EngineOptions {
            report_dir: dir.path().join("reports"),
            ..EngineOptions::default()
        })
    }

    #[test]
    fn test_capture_is_first_seen_only() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("page.html");
        fs::write(&page, FIRST).unwrap();

        let mut store = SnapshotStore::new();
        assert!(store.capture_if_absent(&page).unwrap());

        fs::write(&page, SECOND).unwrap();
        assert!(!store.capture_if_absent(&page).unwrap());
        assert_eq!(store.get(&page), Some(FIRST));
    }

    #[test]
    fn test_is_dirty_tracks_disk_changes() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("page.html");
        fs::write(&page, FIRST).unwrap();

        let mut store = SnapshotStore::new();
        store.capture_if_absent(&page).unwrap();
        assert!(!store.is_dirty(&page).unwrap());

        fs::write(&page, SECOND).unwrap();
        assert!(store.is_dirty(&page).unwrap());
    }

    #[test]
    fn test_restore_round_trip() {
        let tmp = TempDir::new().unwrap();
        let page = tmp.path().join("page.html");
        fs::write(&page, FIRST).unwrap();

        let engine = engine_in(&tmp);
        let mut store = SnapshotStore::new();
        store.capture_if_absent(&page).unwrap();

        let raw = format!("[CODE_START]{SECOND}[CODE_END]");
        engine.apply_response(&raw, &page).0.unwrap();
        assert_eq!(fs::read_to_string(&page).unwrap(), SECOND);

        let (result, report) = store.restore(&engine, &page).unwrap();
        assert!(result.is_ok());
        assert!(report.success);
        assert_eq!(fs::read_to_string(&page).unwrap(), FIRST);
        assert!(!store.is_dirty(&page).unwrap());
    }

    #[test]
    fn test_restore_without_snapshot_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new();
        assert!(store
            .restore(&engine_in(&tmp), &tmp.path().join("page.html"))
            .is_none());
    }
}
