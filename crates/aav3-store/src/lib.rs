//! On-disk layout for one session: `aav3_<session_id>/{environment.json,
//! plan.json, research.json, implementation.json, implementation_history/,
//! review.json, test_result.json, test_history/, consensus.json,
//! conversation.jsonl, verdict.json, workspace/}` (spec.md §4.8).
//!
//! Every artifact write goes through a temp-file-then-rename so a crash
//! mid-write never leaves a half-written file behind, the same discipline
//! the teacher workspace uses for its own on-disk state.

use std::fs;
use std::path::{Path, PathBuf};

use aav3_core::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create the full directory layout for a brand-new session.
    pub fn create(base_dir: &Path, session_id: &str) -> Result<Self, AppError> {
        let root = base_dir.join(format!("aav3_{session_id}"));
        fs::create_dir_all(&root).map_err(|e| fs_err(&root, e))?;
        fs::create_dir_all(root.join("implementation_history")).map_err(|e| fs_err(&root, e))?;
        fs::create_dir_all(root.join("test_history")).map_err(|e| fs_err(&root, e))?;
        fs::create_dir_all(root.join("workspace")).map_err(|e| fs_err(&root, e))?;
        let conversation_path = root.join("conversation.jsonl");
        if !conversation_path.exists() {
            fs::write(&conversation_path, b"").map_err(|e| fs_err(&conversation_path, e))?;
        }
        Ok(Self { root })
    }

    /// Reopen an existing session directory. Does not create anything;
    /// fails if the directory is absent.
    pub fn open(base_dir: &Path, session_id: &str) -> Result<Self, AppError> {
        let root = base_dir.join(format!("aav3_{session_id}"));
        if !root.is_dir() {
            return Err(AppError::FilesystemError {
                path: root.display().to_string(),
                reason: "session directory does not exist".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    pub fn conversation_log_path(&self) -> PathBuf {
        self.root.join("conversation.jsonl")
    }

    pub fn write_environment<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("environment.json"), v)
    }

    pub fn read_environment<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("environment.json"))
    }

    pub fn write_plan<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("plan.json"), v)
    }

    pub fn read_plan<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("plan.json"))
    }

    pub fn write_research<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("research.json"), v)
    }

    pub fn read_research<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("research.json"))
    }

    /// Writes `implementation.json` (the current round) and also appends a
    /// copy to `implementation_history/round_<n>.json`, where `<n>` is the
    /// count of rounds already recorded.
    pub fn write_implementation<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("implementation.json"), v)?;
        let round = self.count_history_files("implementation_history")?;
        let history_path = self
            .root
            .join("implementation_history")
            .join(format!("round_{round}.json"));
        atomic_write_json(&history_path, v)
    }

    pub fn read_implementation<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("implementation.json"))
    }

    pub fn write_review<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("review.json"), v)
    }

    pub fn read_review<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("review.json"))
    }

    /// Writes `test_result.json` (the current round) and also appends a
    /// copy to `test_history/round_<n>.json`.
    pub fn write_test_result<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("test_result.json"), v)?;
        let round = self.count_history_files("test_history")?;
        let history_path = self.root.join("test_history").join(format!("round_{round}.json"));
        atomic_write_json(&history_path, v)
    }

    pub fn read_test_result<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("test_result.json"))
    }

    pub fn write_consensus<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("consensus.json"), v)
    }

    pub fn read_consensus<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("consensus.json"))
    }

    pub fn write_verdict<T: Serialize>(&self, v: &T) -> Result<(), AppError> {
        atomic_write_json(&self.root.join("verdict.json"), v)
    }

    pub fn read_verdict<T: DeserializeOwned>(&self) -> Result<Option<T>, AppError> {
        read_json_corrupt_tolerant(&self.root.join("verdict.json"))
    }

    /// Count how many `round_*.json` files already exist in a history
    /// subdirectory, so the next write lands at `round_<count>.json`.
    fn count_history_files(&self, subdir: &str) -> Result<usize, AppError> {
        let dir = self.root.join(subdir);
        let entries = fs::read_dir(&dir).map_err(|e| fs_err(&dir, e))?;
        let count = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| n.starts_with("round_") && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .count();
        Ok(count)
    }
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let parent = path.parent().ok_or_else(|| AppError::FilesystemError {
        path: path.display().to_string(),
        reason: "target path has no parent directory".to_string(),
    })?;
    let json = serde_json::to_string_pretty(value).map_err(|e| AppError::FilesystemError {
        path: path.display().to_string(),
        reason: format!("failed to serialize: {e}"),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| fs_err(parent, e))?;
    std::io::Write::write_all(&mut tmp, json.as_bytes()).map_err(|e| fs_err(path, e))?;
    tmp.persist(path)
        .map_err(|e| fs_err(path, std::io::Error::other(e.to_string())))?;
    Ok(())
}

/// Reads and parses `path` as JSON. If the file is absent, returns `Ok(None)`.
/// If the file exists but fails to parse, renames it to `<name>.corrupt`,
/// logs a warning, and returns `Ok(None)` rather than failing the whole
/// session — a resumed session should tolerate a half-written artifact from
/// a prior crash instead of refusing to start.
fn read_json_corrupt_tolerant<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|e| fs_err(path, e))?;
    match serde_json::from_str::<T>(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let corrupt_path = path.with_extension(format!(
                "{}.corrupt",
                path.extension().and_then(|e| e.to_str()).unwrap_or("json")
            ));
            tracing::warn!(
                path = %path.display(),
                corrupt_path = %corrupt_path.display(),
                error = %e,
                "artifact failed to parse; quarantining and resuming as absent"
            );
            if let Err(rename_err) = fs::rename(path, &corrupt_path) {
                tracing::warn!(path = %path.display(), error = %rename_err, "failed to quarantine corrupt artifact");
            }
            Ok(None)
        }
    }
}

fn fs_err(path: &Path, e: std::io::Error) -> AppError {
    AppError::FilesystemError {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Thing {
        n: u32,
    }

    #[test]
    fn create_lays_out_the_full_directory_structure() {
        let base = tempfile::tempdir().unwrap();
        let store = SessionStore::create(base.path(), "abc123").unwrap();
        assert!(store.root().join("implementation_history").is_dir());
        assert!(store.root().join("test_history").is_dir());
        assert!(store.workspace_dir().is_dir());
        assert!(store.conversation_log_path().is_file());
    }

    #[test]
    fn open_fails_for_a_missing_session() {
        let base = tempfile::tempdir().unwrap();
        let err = SessionStore::open(base.path(), "does-not-exist").unwrap_err();
        assert_eq!(err.kind(), "FilesystemError");
    }

    #[test]
    fn write_then_read_roundtrips() {
        let base = tempfile::tempdir().unwrap();
        let store = SessionStore::create(base.path(), "s1").unwrap();
        store.write_plan(&Thing { n: 7 }).unwrap();
        let read: Option<Thing> = store.read_plan().unwrap();
        assert_eq!(read, Some(Thing { n: 7 }));
    }

    #[test]
    fn read_of_absent_artifact_is_none_not_an_error() {
        let base = tempfile::tempdir().unwrap();
        let store = SessionStore::create(base.path(), "s1").unwrap();
        let read: Option<Thing> = store.read_research().unwrap();
        assert_eq!(read, None);
    }

    #[test]
    fn implementation_history_accumulates_one_file_per_round() {
        let base = tempfile::tempdir().unwrap();
        let store = SessionStore::create(base.path(), "s1").unwrap();
        store.write_implementation(&Thing { n: 1 }).unwrap();
        store.write_implementation(&Thing { n: 2 }).unwrap();
        store.write_implementation(&Thing { n: 3 }).unwrap();

        assert!(store.root().join("implementation_history/round_0.json").is_file());
        assert!(store.root().join("implementation_history/round_1.json").is_file());
        assert!(store.root().join("implementation_history/round_2.json").is_file());

        let current: Option<Thing> = store.read_implementation().unwrap();
        assert_eq!(current, Some(Thing { n: 3 }));
    }

    #[test]
    fn test_history_accumulates_one_file_per_round() {
        let base = tempfile::tempdir().unwrap();
        let store = SessionStore::create(base.path(), "s1").unwrap();
        store.write_test_result(&Thing { n: 1 }).unwrap();
        store.write_test_result(&Thing { n: 2 }).unwrap();

        assert!(store.root().join("test_history/round_0.json").is_file());
        assert!(store.root().join("test_history/round_1.json").is_file());
    }

    #[test]
    fn corrupt_artifact_is_quarantined_and_read_as_absent() {
        let base = tempfile::tempdir().unwrap();
        let store = SessionStore::create(base.path(), "s1").unwrap();
        let path = store.root().join("plan.json");
        fs::write(&path, b"{ not valid json").unwrap();

        let read: Option<Thing> = store.read_plan().unwrap();
        assert_eq!(read, None);
        assert!(!path.exists());
        assert!(store.root().join("plan.json.corrupt").exists());
    }

    #[test]
    fn reopen_after_create_sees_the_same_artifacts() {
        let base = tempfile::tempdir().unwrap();
        {
            let store = SessionStore::create(base.path(), "s1").unwrap();
            store.write_research(&Thing { n: 42 }).unwrap();
        }
        let reopened = SessionStore::open(base.path(), "s1").unwrap();
        let read: Option<Thing> = reopened.read_research().unwrap();
        assert_eq!(read, Some(Thing { n: 42 }));
    }
}
