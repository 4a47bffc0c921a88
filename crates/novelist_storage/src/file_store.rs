//! File-backed run store.
//!
//! Layout under the state directory:
//!
//! ```text
//! <root>/<run_id>/run_state.json
//! <root>/<run_id>/concepts.json
//! <root>/<run_id>/scores.json
//! <root>/<run_id>/concepts/<concept_id>/history.jsonl
//! <root>/<run_id>/concepts/<concept_id>/manuscript.md
//! ```
//!
//! JSON documents and manuscripts are written to a temporary sibling and
//! renamed into place. History logs are appended one line per record and
//! synced before the append returns. A trailing line without a newline is
//! the remains of an interrupted append; it is ignored on load and cut off
//! before the next append.

use async_trait::async_trait;
use novelist_core::{
    Concept, ConceptId, HistoryRecord, ManuscriptDraft, RunId, RunState, Score, apply_record,
};
use novelist_error::{NovelistResult, StorageError, StorageErrorKind};
use novelist_interface::RunStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const RUN_STATE_FILE: &str = "run_state.json";
const CONCEPTS_FILE: &str = "concepts.json";
const SCORES_FILE: &str = "scores.json";
const HISTORY_FILE: &str = "history.jsonl";
const MANUSCRIPT_FILE: &str = "manuscript.md";

type HistoryLocks = Arc<Mutex<HashMap<(RunId, ConceptId), Arc<Mutex<()>>>>>;

/// Run store keeping every run in a directory under `root`.
#[derive(Debug, Clone)]
pub struct FileRunStore {
    root: PathBuf,
    history_locks: HistoryLocks,
}

fn io_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::new(StorageErrorKind::Io(format!("{}: {}", path.display(), err)))
}

fn serialization_error(path: &Path, err: serde_json::Error) -> StorageError {
    StorageError::new(StorageErrorKind::Serialization(format!(
        "{}: {}",
        path.display(),
        err
    )))
}

/// Parsed contents of a history log.
struct HistoryLog {
    records: Vec<HistoryRecord>,
    /// Byte length of the complete lines
    valid_len: u64,
    /// Byte length of the file
    file_len: u64,
}

impl FileRunStore {
    /// Create a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            history_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Root state directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one run.
    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }

    /// Directory of one concept within a run.
    pub fn concept_dir(&self, run_id: &RunId, concept_id: ConceptId) -> PathBuf {
        self.run_dir(run_id)
            .join("concepts")
            .join(concept_id.to_string())
    }

    /// Path of the exported manuscript of a concept.
    pub fn manuscript_path(&self, run_id: &RunId, concept_id: ConceptId) -> PathBuf {
        self.concept_dir(run_id, concept_id).join(MANUSCRIPT_FILE)
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;
        file.sync_all().await.map_err(|e| io_error(&tmp_path, e))?;
        drop(file);
        fs::rename(&tmp_path, path)
            .await
            .map_err(|e| io_error(path, e))?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| serialization_error(path, e))?;
        self.write_atomic(path, &json).await
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StorageError> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| serialization_error(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn history_lock(&self, run_id: &RunId, concept_id: ConceptId) -> Arc<Mutex<()>> {
        let mut locks = self.history_locks.lock().await;
        locks
            .entry((run_id.clone(), concept_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_history_log(&self, path: &Path) -> Result<HistoryLog, StorageError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HistoryLog {
                    records: Vec::new(),
                    valid_len: 0,
                    file_len: 0,
                });
            }
            Err(e) => return Err(io_error(path, e)),
        };

        let valid_len = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        if valid_len < bytes.len() {
            warn!(
                path = %path.display(),
                torn_bytes = bytes.len() - valid_len,
                "Ignoring incomplete trailing history record"
            );
        }

        let mut records = Vec::new();
        for line in bytes[..valid_len].split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let record: HistoryRecord =
                serde_json::from_slice(line).map_err(|e| serialization_error(path, e))?;
            records.push(record);
        }

        Ok(HistoryLog {
            records,
            valid_len: valid_len as u64,
            file_len: bytes.len() as u64,
        })
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    #[instrument(skip(self), fields(run_id = %run_id))]
    async fn load_state(&self, run_id: &RunId) -> NovelistResult<Option<RunState>> {
        let path = self.run_dir(run_id).join(RUN_STATE_FILE);
        Ok(self.read_json(&path).await?)
    }

    #[instrument(skip(self, state), fields(run_id = %state.run_id(), phase = %state.phase()))]
    async fn save_state(&self, state: &RunState) -> NovelistResult<()> {
        let path = self.run_dir(state.run_id()).join(RUN_STATE_FILE);
        self.write_json(&path, state).await?;
        debug!("Saved run state");
        Ok(())
    }

    async fn save_concepts(&self, run_id: &RunId, concepts: &[Concept]) -> NovelistResult<()> {
        let path = self.run_dir(run_id).join(CONCEPTS_FILE);
        Ok(self.write_json(&path, concepts).await?)
    }

    async fn load_concepts(&self, run_id: &RunId) -> NovelistResult<Vec<Concept>> {
        let path = self.run_dir(run_id).join(CONCEPTS_FILE);
        Ok(self.read_json(&path).await?.unwrap_or_default())
    }

    async fn save_scores(&self, run_id: &RunId, scores: &[Score]) -> NovelistResult<()> {
        let path = self.run_dir(run_id).join(SCORES_FILE);
        Ok(self.write_json(&path, scores).await?)
    }

    async fn load_scores(&self, run_id: &RunId) -> NovelistResult<Vec<Score>> {
        let path = self.run_dir(run_id).join(SCORES_FILE);
        Ok(self.read_json(&path).await?.unwrap_or_default())
    }

    #[instrument(
        skip(self, record),
        fields(run_id = %run_id, concept_id = %record.concept_id(), iteration = record.iteration())
    )]
    async fn append_history(&self, run_id: &RunId, record: &HistoryRecord) -> NovelistResult<()> {
        let concept_id = record.concept_id();
        let lock = self.history_lock(run_id, concept_id).await;
        let _guard = lock.lock().await;

        let dir = self.concept_dir(run_id, concept_id);
        let path = dir.join(HISTORY_FILE);
        let log = self.read_history_log(&path).await?;

        let mut drafts = Vec::new();
        for existing in log.records {
            apply_record(&mut drafts, existing)?;
        }
        apply_record(&mut drafts, record.clone())?;

        let mut line = serde_json::to_vec(record).map_err(|e| serialization_error(&path, e))?;
        line.push(b'\n');

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        if log.valid_len < log.file_len {
            file.set_len(log.valid_len)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        file.write_all(&line)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.sync_data().await.map_err(|e| io_error(&path, e))?;

        debug!("Appended history record");
        Ok(())
    }

    async fn load_history(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
    ) -> NovelistResult<Vec<ManuscriptDraft>> {
        let path = self.concept_dir(run_id, concept_id).join(HISTORY_FILE);
        let log = self.read_history_log(&path).await?;
        let mut drafts = Vec::new();
        for record in log.records {
            apply_record(&mut drafts, record)?;
        }
        Ok(drafts)
    }

    #[instrument(skip(self, text), fields(run_id = %run_id, concept_id = %concept_id))]
    async fn export_manuscript(
        &self,
        run_id: &RunId,
        concept_id: ConceptId,
        text: &str,
    ) -> NovelistResult<()> {
        let path = self.manuscript_path(run_id, concept_id);
        self.write_atomic(&path, text.as_bytes()).await?;
        debug!(path = %path.display(), "Exported manuscript");
        Ok(())
    }
}
