//! Generation history persistence
//!
//! Keeps every successful generation in `history.json`, newest first. Each
//! mutation rewrites the whole snapshot; there is no merging, so two processes
//! writing the same file leave whatever the last writer saw.
//!
//! On-disk format:
//!
//! ```json
//! {"version": 1, "entries": [{"id": "...", "timestamp": 1700000000000, ...}]}
//! ```
//!
//! A bare array of entries (the unversioned format) is still read and is
//! rewritten in the current format on the next mutation.

use crate::github::RepositoryIdentifier;
use crate::suggest::{GenerationRequest, GenerationResult, IssueSuggestion};
use crate::util::{now_millis, preserve_corrupt, sidecar_path, write_atomic};
use anyhow::Context;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Snapshot format written by this version.
pub const HISTORY_FORMAT_VERSION: u32 = 1;

const HISTORY_LOCK_TIMEOUT_SECS: u64 = 5;
const HISTORY_LOCK_RETRY_MS: u64 = 50;

/// One successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub repository: RepositoryIdentifier,
    /// URL exactly as the user entered it.
    pub repository_url: String,
    pub suggestions: Vec<IssueSuggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
}

impl HistoryEntry {
    /// Stamp a new entry with a fresh id and the current time. Blank goals are
    /// dropped; others are kept as entered.
    pub fn new(
        repository: RepositoryIdentifier,
        repository_url: impl Into<String>,
        suggestions: Vec<IssueSuggestion>,
        goals: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now_millis(),
            repository,
            repository_url: repository_url.into(),
            suggestions,
            goals: goals
                .filter(|g| !g.trim().is_empty())
                .map(str::to_string),
        }
    }

    pub fn from_generation(request: &GenerationRequest, result: GenerationResult) -> Self {
        Self::new(
            result.repository,
            request.repository_url.trim(),
            result.suggestions,
            request.goals(),
        )
    }

    /// Local time of creation, for display.
    pub fn created_at(&self) -> Option<chrono::DateTime<chrono::Local>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
            .map(|utc| utc.with_timezone(&chrono::Local))
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    entries: &'a [HistoryEntry],
}

/// Entry shape of the unversioned format.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    id: String,
    timestamp: i64,
    repo_info: LegacyRepoInfo,
    #[serde(default)]
    suggestions: Vec<IssueSuggestion>,
    #[serde(default)]
    goals: Option<String>,
}

#[derive(Deserialize)]
struct LegacyRepoInfo {
    #[serde(flatten)]
    repository: RepositoryIdentifier,
    url: String,
}

impl From<LegacyEntry> for HistoryEntry {
    fn from(legacy: LegacyEntry) -> Self {
        Self {
            id: legacy.id,
            timestamp: legacy.timestamp,
            repository: legacy.repo_info.repository,
            repository_url: legacy.repo_info.url,
            suggestions: legacy.suggestions,
            goals: legacy.goals.filter(|g| !g.trim().is_empty()),
        }
    }
}

/// Decode every element of `items`, naming the first one that fails.
fn decode_entries<T: serde::de::DeserializeOwned>(
    items: Vec<serde_json::Value>,
) -> Result<Vec<T>, String> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| serde_json::from_value(item).map_err(|e| format!("entry {}: {}", idx, e)))
        .collect()
}

/// Decode a snapshot, upgrading the unversioned format.
///
/// The version is checked before any entry is looked at, so the error for a
/// bad file names either the version or the entry and field that failed.
fn decode_snapshot(content: &str) -> Result<Vec<HistoryEntry>, String> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    match value {
        serde_json::Value::Array(items) => {
            let legacy: Vec<LegacyEntry> = decode_entries(items)?;
            tracing::info!(count = legacy.len(), "reading unversioned history snapshot");
            Ok(legacy.into_iter().map(HistoryEntry::from).collect())
        }
        serde_json::Value::Object(mut snapshot) => {
            let version = snapshot
                .get("version")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| "missing history format version".to_string())?;
            if version != u64::from(HISTORY_FORMAT_VERSION) {
                return Err(format!("unsupported history format version {}", version));
            }
            match snapshot.remove("entries") {
                Some(serde_json::Value::Array(items)) => decode_entries(items),
                Some(_) => Err("`entries` is not an array".to_string()),
                None => Err("missing `entries`".to_string()),
            }
        }
        _ => Err("not a history snapshot".to_string()),
    }
}

struct HistoryLock {
    file: fs::File,
}

impl Drop for HistoryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock(path: &Path, exclusive: bool) -> anyhow::Result<HistoryLock> {
    let lock_path = sidecar_path(path, ".lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("Failed to open {}", lock_path.display()))?;

    let start = Instant::now();
    loop {
        let result = if exclusive {
            FileExt::try_lock_exclusive(&file)
        } else {
            FileExt::try_lock_shared(&file)
        };
        match result {
            Ok(()) => break,
            Err(err) => {
                if err.kind() != ErrorKind::WouldBlock {
                    return Err(err.into());
                }
                if start.elapsed() >= Duration::from_secs(HISTORY_LOCK_TIMEOUT_SECS) {
                    return Err(anyhow::anyhow!(
                        "Timed out waiting for history lock ({}s)",
                        HISTORY_LOCK_TIMEOUT_SECS
                    ));
                }
                std::thread::sleep(Duration::from_millis(HISTORY_LOCK_RETRY_MS));
            }
        }
    }

    Ok(HistoryLock { file })
}

/// Read the snapshot at `path`. Never fails: absence and corruption both give
/// an empty log, and corrupt data is moved aside first.
fn read_entries(path: &Path) -> Vec<HistoryEntry> {
    if !path.exists() {
        return Vec::new();
    }

    let _lock = match lock(path, false) {
        Ok(lock) => Some(lock),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "reading history without lock");
            None
        }
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read history");
            return Vec::new();
        }
    };

    match decode_snapshot(&content) {
        Ok(entries) => entries,
        Err(reason) => {
            let backup = preserve_corrupt(path, &content);
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                %reason,
                "history was unreadable; starting with an empty log"
            );
            Vec::new()
        }
    }
}

/// Durable, newest-first log of past generations.
pub struct HistoryStore {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Open the store at `path` and load whatever is there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the snapshot from disk, replacing the in-memory log.
    pub fn load(&mut self) -> &[HistoryEntry] {
        self.entries = read_entries(&self.path);
        &self.entries
    }

    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepend `entry` and persist.
    pub fn add(&mut self, entry: HistoryEntry) -> anyhow::Result<&[HistoryEntry]> {
        let mut next = Vec::with_capacity(self.entries.len() + 1);
        next.push(entry);
        next.extend(self.entries.iter().cloned());
        self.replace(next)
    }

    /// Remove the entry with `id` and persist. Unknown ids are a no-op.
    pub fn delete(&mut self, id: &str) -> anyhow::Result<&[HistoryEntry]> {
        if self.get(id).is_none() {
            tracing::debug!(id, "no history entry to delete");
            return Ok(&self.entries);
        }
        let next = self
            .entries
            .iter()
            .filter(|e| e.id != id)
            .cloned()
            .collect();
        self.replace(next)
    }

    /// Drop every entry and persist. Callers must confirm with the user first.
    pub fn clear(&mut self) -> anyhow::Result<&[HistoryEntry]> {
        self.replace(Vec::new())
    }

    /// Write `next` to disk, then adopt it. A failed write leaves the old log in place.
    fn replace(&mut self, next: Vec<HistoryEntry>) -> anyhow::Result<&[HistoryEntry]> {
        self.persist(&next)?;
        self.entries = next;
        Ok(&self.entries)
    }

    fn persist(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let _lock = lock(&self.path, true)?;
        let content = serde_json::to_string_pretty(&SnapshotOut {
            version: HISTORY_FORMAT_VERSION,
            entries,
        })
        .context("Failed to serialize history")?;
        write_atomic(&self.path, &content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), count = entries.len(), "history saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::locate;
    use crate::suggest::IssueType;
    use tempfile::tempdir;

    fn entry(repo: &str, title: &str) -> HistoryEntry {
        let url = format!("https://github.com/{}", repo);
        HistoryEntry::new(
            locate(&url).unwrap(),
            url,
            vec![IssueSuggestion {
                title: title.into(),
                body: "body".into(),
                kind: IssueType::Feature,
                reasoning: "because".into(),
            }],
            None,
        )
    }

    fn ids(entries: &[HistoryEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("nested/history.json"));
        assert!(store.is_empty());
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_add_survives_reopen_newest_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = HistoryStore::open(&path);
        let first = entry("octocat/Hello-World", "one");
        let second = entry("rust-lang/rust", "two");
        store.add(first.clone()).unwrap();
        store.add(second.clone()).unwrap();

        let reopened = HistoryStore::open(&path);
        assert_eq!(reopened.list(), &[second, first]);
    }

    #[test]
    fn test_add_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/history.json");
        let mut store = HistoryStore::open(&path);
        store.add(entry("octocat/Hello-World", "one")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_delete_removes_one_and_keeps_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);
        for title in ["a", "b", "c", "d"] {
            store.add(entry("octocat/Hello-World", title)).unwrap();
        }
        let before = ids(store.list());

        let remaining = ids(store.delete(&before[1]).unwrap());
        assert_eq!(remaining, vec![before[0].clone(), before[2].clone(), before[3].clone()]);
        assert_eq!(ids(HistoryStore::open(&path).list()), remaining);
    }

    #[test]
    fn test_delete_unknown_id_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);
        assert!(store.delete("missing").unwrap().is_empty());
        assert!(!path.exists());

        store.add(entry("octocat/Hello-World", "a")).unwrap();
        assert_eq!(store.delete("missing").unwrap().len(), 1);
    }

    #[test]
    fn test_clear_empties_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);
        store.add(entry("octocat/Hello-World", "a")).unwrap();
        store.add(entry("octocat/Hello-World", "b")).unwrap();

        assert!(store.clear().unwrap().is_empty());
        assert!(HistoryStore::open(&path).is_empty());
    }

    #[test]
    fn test_snapshot_is_versioned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);
        store.add(entry("octocat/Hello-World", "a")).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["entries"][0]["repository"]["owner"], "octocat");
        assert_eq!(
            raw["entries"][0]["repositoryUrl"],
            "https://github.com/octocat/Hello-World"
        );
        assert!(raw["entries"][0].get("goals").is_none());
    }

    #[test]
    fn test_corrupt_file_is_preserved_and_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ definitely not history").unwrap();

        let store = HistoryStore::open(&path);
        assert!(store.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("history.json.corrupt")).unwrap(),
            "{ definitely not history"
        );
    }

    #[test]
    fn test_newer_version_is_treated_as_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, r#"{"version": 2, "entries": []}"#).unwrap();

        assert!(HistoryStore::open(&path).is_empty());
        assert!(dir.path().join("history.json.corrupt").exists());
    }

    #[test]
    fn test_decode_error_names_failing_entry() {
        let content = r#"{"version": 1, "entries": [{"id": "a", "timestamp": 1}]}"#;
        let reason = decode_snapshot(content).unwrap_err();
        assert!(reason.contains("entry 0"), "{}", reason);
        assert!(reason.contains("repository"), "{}", reason);
    }

    #[test]
    fn test_decode_error_names_version_problems() {
        assert!(decode_snapshot(r#"{"entries": []}"#)
            .unwrap_err()
            .contains("version"));
        assert!(decode_snapshot(r#"{"version": 1}"#)
            .unwrap_err()
            .contains("entries"));
        assert!(decode_snapshot(r#"{"version": 1, "entries": []}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unversioned_array_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let legacy = r#"[
            {
                "id": "1700000000000",
                "timestamp": 1700000000000,
                "repoInfo": {"owner": "octocat", "name": "Hello-World", "url": "https://github.com/octocat/Hello-World"},
                "suggestions": [{"title": "T", "body": "B", "type": "Bug", "reasoning": "R"}],
                "goals": "speed"
            }
        ]"#;
        fs::write(&path, legacy).unwrap();

        let mut store = HistoryStore::open(&path);
        assert_eq!(store.len(), 1);
        let old = store.get("1700000000000").unwrap().clone();
        assert_eq!(old.repository.to_string(), "octocat/Hello-World");
        assert_eq!(old.repository_url, "https://github.com/octocat/Hello-World");
        assert_eq!(old.goals.as_deref(), Some("speed"));

        store.add(entry("rust-lang/rust", "new")).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["entries"][1]["id"], "1700000000000");
    }

    #[test]
    fn test_load_picks_up_external_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut reader = HistoryStore::open(&path);
        let mut writer = HistoryStore::open(&path);
        writer.add(entry("octocat/Hello-World", "a")).unwrap();

        assert!(reader.is_empty());
        assert_eq!(reader.load().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_keeps_memory_unchanged() {
        let dir = tempdir().unwrap();
        // A directory where the snapshot should be makes the final rename fail
        let path = dir.path().join("history.json");
        fs::create_dir(&path).unwrap();

        let mut store = HistoryStore::open(&path);
        assert!(store.add(entry("octocat/Hello-World", "a")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_entry_new_drops_blank_goals() {
        let repo = locate("https://github.com/octocat/Hello-World").unwrap();
        let blank = HistoryEntry::new(repo.clone(), "u", Vec::new(), Some("   "));
        let set = HistoryEntry::new(repo, "u", Vec::new(), Some(" docs "));
        assert!(blank.goals.is_none());
        assert_eq!(set.goals.as_deref(), Some(" docs "));
        assert_ne!(blank.id, set.id);
        assert!(blank.created_at().is_some());
    }

    #[test]
    fn test_from_generation_keeps_request_details() {
        let request = GenerationRequest::new(" https://github.com/octocat/Hello-World/tree/main ")
            .with_goals("offline mode");
        let result = GenerationResult {
            repository: locate(&request.repository_url).unwrap(),
            suggestions: Vec::new(),
        };
        let entry = HistoryEntry::from_generation(&request, result);
        assert_eq!(
            entry.repository_url,
            "https://github.com/octocat/Hello-World/tree/main"
        );
        assert_eq!(entry.goals.as_deref(), Some("offline mode"));
    }
}
