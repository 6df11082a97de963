//! Durable, append-only record of rendered seconds.
//!
//! Layout under `<output_dir>/checkpoints/<output_stem>/`:
//! - `manifest.json`: run identity, replaced atomically
//! - `journal.jsonl`: one JSON record per line, appended and flushed per second
//! - `clip_NNNNNN.mp4`: per-second artifacts
//!
//! A journal line only counts once its terminating newline is on disk, so a
//! record torn by a crash is never read back as valid. Second records count
//! only over the contiguous prefix whose artifacts are non-empty files;
//! opening a store rewrites the journal down to that prefix.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use beatclip_media::fs_utils::write_atomic;
use beatclip_media::MediaError;
use beatclip_models::SourceId;

pub const MANIFEST_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const JOURNAL_FILE: &str = "journal.jsonl";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint {field} mismatch: stored {stored}, requested {requested}")]
    Mismatch {
        field: &'static str,
        stored: String,
        requested: String,
    },

    #[error("second {got} recorded out of order, expected {expected}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl CheckpointError {
    /// Stored identity does not match the requested run.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            CheckpointError::Mismatch { .. } | CheckpointError::UnsupportedVersion(_)
        )
    }
}

pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Run metadata persisted next to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub seed: u64,
    pub output_path: PathBuf,
    pub requested_duration: f64,
    pub total_seconds: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JournalEntry {
    Second {
        second_index: usize,
        /// Relative to the checkpoint directory when inside it
        artifact: PathBuf,
    },
    Blacklist {
        source: SourceId,
    },
}

/// Identity of a run, validated against an existing checkpoint.
#[derive(Debug, Clone)]
pub struct RunIdentity {
    pub output_path: PathBuf,
    pub requested_duration: f64,
    pub total_seconds: usize,
    /// Configured seed; `None` adopts the stored one
    pub seed: Option<u64>,
}

/// What a journal holds once torn and out-of-prefix records are discarded.
#[derive(Debug, Default)]
struct JournalState {
    /// Artifacts for seconds `0..resume_index`
    artifacts: Vec<PathBuf>,
    blacklist: Vec<SourceId>,
    /// Distinct seconds with a well-formed record
    recorded: usize,
    torn: bool,
}

/// Checkpoint directory for an output path.
pub fn checkpoint_dir(output_path: &Path) -> PathBuf {
    let parent = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    parent.join("checkpoints").join(stem)
}

async fn read_journal(dir: &Path) -> CheckpointResult<JournalState> {
    let path = dir.join(JOURNAL_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JournalState::default()),
        Err(e) => return Err(e.into()),
    };

    let mut state = JournalState::default();
    let mut seconds: BTreeMap<usize, PathBuf> = BTreeMap::new();
    let mut seen_blacklist = HashSet::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let Some(newline) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            state.torn = true;
            break;
        };
        let line = &bytes[offset..offset + newline];
        let entry = match serde_json::from_slice::<JournalEntry>(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(offset, "Discarding corrupt journal tail: {}", e);
                state.torn = true;
                break;
            }
        };
        offset += newline + 1;

        match entry {
            JournalEntry::Second {
                second_index,
                artifact,
            } => {
                seconds.insert(second_index, dir.join(artifact));
            }
            JournalEntry::Blacklist { source } => {
                if seen_blacklist.insert(source.clone()) {
                    state.blacklist.push(source);
                }
            }
        }
    }
    state.recorded = seconds.len();

    // Only the contiguous prefix counts; a missing or empty artifact is a gap
    let mut next = 0usize;
    while let Some(artifact) = seconds.get(&next) {
        let usable = tokio::fs::metadata(artifact)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !usable {
            debug!(second = next, "Checkpointed artifact missing or empty, resuming here");
            break;
        }
        state.artifacts.push(artifact.clone());
        next += 1;
    }

    Ok(state)
}

async fn read_manifest(dir: &Path) -> CheckpointResult<Option<Manifest>> {
    match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Journal path for an artifact: relative when inside the checkpoint.
fn stored_artifact(dir: &Path, artifact: &Path) -> PathBuf {
    artifact
        .strip_prefix(dir)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| artifact.to_path_buf())
}

/// Journal bytes holding exactly `artifacts` and `blacklist`.
fn encode_journal(dir: &Path, artifacts: &[PathBuf], blacklist: &[SourceId]) -> CheckpointResult<Vec<u8>> {
    let blacklist = blacklist.iter().map(|source| JournalEntry::Blacklist {
        source: source.clone(),
    });
    let seconds = artifacts
        .iter()
        .enumerate()
        .map(|(second_index, artifact)| JournalEntry::Second {
            second_index,
            artifact: stored_artifact(dir, artifact),
        });

    let mut bytes = Vec::new();
    for entry in blacklist.chain(seconds) {
        bytes.extend(serde_json::to_vec(&entry)?);
        bytes.push(b'\n');
    }
    Ok(bytes)
}

fn mismatch(field: &'static str, stored: impl ToString, requested: impl ToString) -> CheckpointError {
    CheckpointError::Mismatch {
        field,
        stored: stored.to_string(),
        requested: requested.to_string(),
    }
}

fn validate(manifest: &Manifest, identity: &RunIdentity) -> CheckpointResult<()> {
    if manifest.version != MANIFEST_VERSION {
        return Err(CheckpointError::UnsupportedVersion(manifest.version));
    }
    if manifest.output_path != identity.output_path {
        return Err(mismatch(
            "output_path",
            manifest.output_path.display(),
            identity.output_path.display(),
        ));
    }
    if (manifest.requested_duration - identity.requested_duration).abs() > 1e-6 {
        return Err(mismatch(
            "duration",
            manifest.requested_duration,
            identity.requested_duration,
        ));
    }
    if manifest.total_seconds != identity.total_seconds {
        return Err(mismatch(
            "total_seconds",
            manifest.total_seconds,
            identity.total_seconds,
        ));
    }
    if let Some(seed) = identity.seed {
        if seed != manifest.seed {
            return Err(mismatch("seed", manifest.seed, seed));
        }
    }
    Ok(())
}

/// Single-writer handle on a run's checkpoint.
pub struct CheckpointStore {
    dir: PathBuf,
    manifest: Manifest,
    journal: File,
    artifacts: Vec<PathBuf>,
    blacklist: Vec<SourceId>,
    unsynced: usize,
    sync_interval: usize,
}

impl CheckpointStore {
    /// Resume point and completed artifacts for `output_path`, without
    /// modifying anything on disk.
    pub async fn load(output_path: &Path) -> CheckpointResult<(usize, Vec<PathBuf>)> {
        let dir = checkpoint_dir(output_path);
        if read_manifest(&dir).await?.is_none() {
            return Ok((0, Vec::new()));
        }
        let state = read_journal(&dir).await?;
        Ok((state.artifacts.len(), state.artifacts))
    }

    /// Open or create the checkpoint for a run.
    ///
    /// `fresh_seed` is stored when neither the caller nor an existing
    /// checkpoint supplies one.
    pub async fn open(
        identity: &RunIdentity,
        fresh_seed: u64,
        sync_interval: usize,
    ) -> CheckpointResult<Self> {
        let dir = checkpoint_dir(&identity.output_path);
        tokio::fs::create_dir_all(&dir).await?;

        let manifest = match read_manifest(&dir).await? {
            Some(manifest) => {
                validate(&manifest, identity)?;
                manifest
            }
            None => {
                let manifest = Manifest {
                    version: MANIFEST_VERSION,
                    seed: identity.seed.unwrap_or(fresh_seed),
                    output_path: identity.output_path.clone(),
                    requested_duration: identity.requested_duration,
                    total_seconds: identity.total_seconds,
                    created_at: Utc::now(),
                    completed: false,
                };
                write_atomic(dir.join(MANIFEST_FILE), &serde_json::to_vec_pretty(&manifest)?).await?;
                info!(dir = %dir.display(), seed = manifest.seed, "Created checkpoint");
                manifest
            }
        };

        let mut state = read_journal(&dir).await?;
        let journal_path = dir.join(JOURNAL_FILE);
        state.artifacts.truncate(identity.total_seconds);
        if state.torn || state.recorded > state.artifacts.len() {
            warn!(
                journal = %journal_path.display(),
                kept = state.artifacts.len(),
                discarded = state.recorded - state.artifacts.len(),
                torn = state.torn,
                "Rewriting journal down to its valid prefix"
            );
            let bytes = encode_journal(&dir, &state.artifacts, &state.blacklist)?;
            write_atomic(&journal_path, &bytes).await?;
        }

        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await?;

        Ok(Self {
            dir,
            manifest,
            journal,
            artifacts: state.artifacts,
            blacklist: state.blacklist,
            unsynced: 0,
            sync_interval: sync_interval.max(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Effective seed for the run.
    pub fn seed(&self) -> u64 {
        self.manifest.seed
    }

    /// One past the highest contiguously completed second.
    pub fn resume_index(&self) -> usize {
        self.artifacts.len()
    }

    /// Artifacts for seconds `0..resume_index`, in order.
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Sources blacklisted by earlier attempts of this run.
    pub fn blacklisted(&self) -> &[SourceId] {
        &self.blacklist
    }

    /// Where the artifact for a second lives.
    pub fn artifact_path(&self, second_index: usize) -> PathBuf {
        self.dir.join(format!("clip_{:06}.mp4", second_index))
    }

    /// Persist a completed second. Seconds must be recorded in order.
    pub async fn record(&mut self, second_index: usize, artifact: &Path) -> CheckpointResult<()> {
        let expected = self.resume_index();
        if second_index != expected {
            return Err(CheckpointError::OutOfOrder {
                expected,
                got: second_index,
            });
        }

        self.append(&JournalEntry::Second {
            second_index,
            artifact: stored_artifact(&self.dir, artifact),
        })
        .await?;
        self.artifacts.push(artifact.to_path_buf());
        Ok(())
    }

    /// Persist a blacklist addition so a resumed run keeps excluding it.
    pub async fn record_blacklist(&mut self, source: &SourceId) -> CheckpointResult<()> {
        if self.blacklist.contains(source) {
            return Ok(());
        }
        self.append(&JournalEntry::Blacklist {
            source: source.clone(),
        })
        .await?;
        self.blacklist.push(source.clone());
        Ok(())
    }

    async fn append(&mut self, entry: &JournalEntry) -> CheckpointResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.journal.write_all(&line).await?;
        self.journal.flush().await?;

        self.unsynced += 1;
        if self.unsynced >= self.sync_interval {
            self.sync().await?;
        }
        Ok(())
    }

    /// Durable commit point.
    pub async fn sync(&mut self) -> CheckpointResult<()> {
        self.journal.sync_data().await?;
        if self.unsynced > 0 {
            debug!(records = self.unsynced, "Checkpoint synced");
        }
        self.unsynced = 0;
        Ok(())
    }

    /// Close out the checkpoint after a successful assembly.
    ///
    /// With `retain` the directory is kept and marked completed; otherwise
    /// it is removed.
    pub async fn finalize(mut self, retain: bool) -> CheckpointResult<()> {
        self.sync().await?;
        if retain {
            self.manifest.completed = true;
            write_atomic(
                self.dir.join(MANIFEST_FILE),
                &serde_json::to_vec_pretty(&self.manifest)?,
            )
            .await?;
            info!(dir = %self.dir.display(), "Checkpoint retained");
        } else {
            let dir = self.dir.clone();
            drop(self);
            tokio::fs::remove_dir_all(&dir).await?;
            info!(dir = %dir.display(), "Checkpoint removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity(dir: &TempDir, seed: Option<u64>) -> RunIdentity {
        RunIdentity {
            output_path: dir.path().join("final.mp4"),
            requested_duration: 10.0,
            total_seconds: 10,
            seed,
        }
    }

    async fn write_clip(store: &CheckpointStore, second: usize) -> PathBuf {
        let path = store.artifact_path(second);
        tokio::fs::write(&path, format!("clip {}", second)).await.unwrap();
        path
    }

    #[test]
    fn test_checkpoint_dir_layout() {
        assert_eq!(
            checkpoint_dir(Path::new("/out/video.mp4")),
            PathBuf::from("/out/checkpoints/video")
        );
        assert_eq!(
            checkpoint_dir(Path::new("video.mp4")),
            PathBuf::from("./checkpoints/video")
        );
    }

    #[tokio::test]
    async fn test_fresh_store_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(&identity(&dir, None), 99, 50).await.unwrap();
        assert_eq!(store.resume_index(), 0);
        assert_eq!(store.seed(), 99);
        assert!(store.dir().join(MANIFEST_FILE).exists());

        let (resume, artifacts) = CheckpointStore::load(&dir.path().join("final.mp4")).await.unwrap();
        assert_eq!(resume, 0);
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_load_without_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (resume, artifacts) = CheckpointStore::load(&dir.path().join("none.mp4")).await.unwrap();
        assert_eq!(resume, 0);
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_resume_after_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open(&identity(&dir, Some(7)), 0, 50).await.unwrap();
            for i in 0..4 {
                let clip = write_clip(&store, i).await;
                store.record(i, &clip).await.unwrap();
            }
        }

        let store = CheckpointStore::open(&identity(&dir, None), 0, 50).await.unwrap();
        assert_eq!(store.resume_index(), 4);
        assert_eq!(store.seed(), 7);
        assert_eq!(store.artifacts()[3], store.artifact_path(3));
    }

    #[tokio::test]
    async fn test_torn_record_ignored_and_discarded() {
        let dir = TempDir::new().unwrap();
        let journal = {
            let mut store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
            for i in 0..3 {
                let clip = write_clip(&store, i).await;
                store.record(i, &clip).await.unwrap();
            }
            store.dir().join(JOURNAL_FILE)
        };

        let mut file = OpenOptions::new().append(true).open(&journal).await.unwrap();
        file.write_all(br#"{"type":"second","second_index":3,"artif"#)
            .await
            .unwrap();
        file.flush().await.unwrap();
        drop(file);

        let mut store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
        assert_eq!(store.resume_index(), 3);

        let clip = write_clip(&store, 3).await;
        store.record(3, &clip).await.unwrap();
        drop(store);

        let (resume, _) = CheckpointStore::load(&dir.path().join("final.mp4")).await.unwrap();
        assert_eq!(resume, 4);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_gap() {
        let dir = TempDir::new().unwrap();
        let clip_dir = {
            let mut store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
            for i in 0..5 {
                let clip = write_clip(&store, i).await;
                store.record(i, &clip).await.unwrap();
            }
            store.dir().to_path_buf()
        };
        tokio::fs::remove_file(clip_dir.join("clip_000002.mp4")).await.unwrap();

        let mut store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
        assert_eq!(store.resume_index(), 2);

        // Records past the gap were discarded, not merely skipped
        let clip = write_clip(&store, 2).await;
        store.record(2, &clip).await.unwrap();
        drop(store);
        let (resume, artifacts) = CheckpointStore::load(&dir.path().join("final.mp4")).await.unwrap();
        assert_eq!(resume, 3);
        assert_eq!(artifacts[2], clip_dir.join("clip_000002.mp4"));
    }

    #[tokio::test]
    async fn test_empty_artifact_is_gap() {
        let dir = TempDir::new().unwrap();
        let clip_dir = {
            let mut store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
            store.record_blacklist(&SourceId::from("bad.mp4")).await.unwrap();
            for i in 0..3 {
                let clip = write_clip(&store, i).await;
                store.record(i, &clip).await.unwrap();
            }
            store.dir().to_path_buf()
        };
        tokio::fs::write(clip_dir.join("clip_000001.mp4"), b"").await.unwrap();

        let store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
        assert_eq!(store.resume_index(), 1);
        assert_eq!(store.blacklisted(), &[SourceId::from("bad.mp4")]);

        let journal = tokio::fs::read_to_string(clip_dir.join(JOURNAL_FILE)).await.unwrap();
        assert_eq!(journal.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_record_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(&identity(&dir, None), 0, 50).await.unwrap();
        let clip = write_clip(&store, 1).await;
        let err = store.record(1, &clip).await.unwrap_err();
        assert!(matches!(err, CheckpointError::OutOfOrder { expected: 0, got: 1 }));
    }

    #[tokio::test]
    async fn test_mismatched_seed_and_duration() {
        let dir = TempDir::new().unwrap();
        drop(CheckpointStore::open(&identity(&dir, Some(5)), 0, 50).await.unwrap());

        let err = CheckpointStore::open(&identity(&dir, Some(6)), 0, 50)
            .await
            .err()
            .unwrap();
        assert!(err.is_mismatch());

        let longer = RunIdentity {
            requested_duration: 20.0,
            total_seconds: 20,
            ..identity(&dir, Some(5))
        };
        let err = CheckpointStore::open(&longer, 0, 50).await.err().unwrap();
        assert!(matches!(err, CheckpointError::Mismatch { field: "duration", .. }));
    }

    #[tokio::test]
    async fn test_blacklist_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 1).await.unwrap();
            store.record_blacklist(&SourceId::from("bad.mp4")).await.unwrap();
            store.record_blacklist(&SourceId::from("bad.mp4")).await.unwrap();
        }
        let store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 1).await.unwrap();
        assert_eq!(store.blacklisted(), &[SourceId::from("bad.mp4")]);
    }

    #[tokio::test]
    async fn test_finalize_removes_or_retains() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
        let cp_dir = store.dir().to_path_buf();
        store.finalize(false).await.unwrap();
        assert!(!cp_dir.exists());

        let store = CheckpointStore::open(&identity(&dir, Some(1)), 0, 50).await.unwrap();
        store.finalize(true).await.unwrap();
        let manifest = read_manifest(&cp_dir).await.unwrap().unwrap();
        assert!(manifest.completed);
    }
}
