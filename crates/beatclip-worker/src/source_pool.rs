//! Bank clip pool with a run-scoped blacklist.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use beatclip_models::{SourceEntry, SourceId};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("every source in the pool is blacklisted")]
    PoolExhausted,

    #[error("clip folder not found: {0}")]
    MissingFolder(PathBuf),

    #[error("no .mp4 clips in {0}")]
    EmptyBank(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generator for one output second.
///
/// Mixing the second into the seed makes each second's draws independent of
/// how many draws earlier seconds made, so a resumed run sees the same
/// sequence as an uninterrupted one.
pub fn second_rng(seed: u64, second_index: usize) -> StdRng {
    let mut z = seed ^ (second_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(z ^ (z >> 31))
}

fn is_mp4(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
}

/// Candidate bank clips plus the ids excluded for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct SourcePool {
    entries: Vec<SourceEntry>,
    blacklist: HashSet<SourceId>,
}

impl SourcePool {
    pub fn from_entries(entries: Vec<SourceEntry>) -> Self {
        let blacklist = entries
            .iter()
            .filter(|e| !e.usable)
            .map(|e| e.id.clone())
            .collect();
        Self { entries, blacklist }
    }

    /// Build the pool from the `.mp4` files in `folder`, sorted by path.
    pub async fn scan(folder: &Path) -> Result<Self, PoolError> {
        if !tokio::fs::try_exists(folder).await.unwrap_or(false) {
            return Err(PoolError::MissingFolder(folder.to_path_buf()));
        }

        let mut paths = Vec::new();
        let mut dir = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if is_mp4(&path) && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(PoolError::EmptyBank(folder.to_path_buf()));
        }
        paths.sort();

        info!(folder = %folder.display(), clips = paths.len(), "Scanned clip bank");
        Ok(Self::from_entries(
            paths.into_iter().map(SourceEntry::from_path).collect(),
        ))
    }

    /// Uniform draw from the entries that are not blacklisted.
    pub fn select<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        second_index: usize,
    ) -> Result<SourceEntry, PoolError> {
        let usable: Vec<&SourceEntry> = self.entries.iter().filter(|e| e.usable).collect();
        if usable.is_empty() {
            return Err(PoolError::PoolExhausted);
        }

        let entry = usable[rng.random_range(0..usable.len())];
        debug!(second = second_index, source = %entry.id, "Selected source");
        Ok(entry.clone())
    }

    /// Exclude `id` from selection for the rest of the run.
    ///
    /// Returns true if the id was newly blacklisted.
    pub fn blacklist(&mut self, id: &SourceId) -> bool {
        if !self.blacklist.insert(id.clone()) {
            return false;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.id == id) {
            entry.usable = false;
        }
        true
    }

    /// Size of the blacklist; grows with every new entry and never shrinks,
    /// so two snapshots of one pool with equal generations select alike.
    pub fn generation(&self) -> usize {
        self.blacklist.len()
    }

    pub fn is_blacklisted(&self, id: &SourceId) -> bool {
        self.blacklist.contains(id)
    }

    /// Cache a probed duration on the entry.
    pub fn record_duration(&mut self, id: &SourceId, seconds: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.id == id) {
            entry.duration = Some(seconds);
        }
    }

    pub fn get(&self, id: &SourceId) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Number of entries still selectable.
    pub fn available(&self) -> usize {
        self.entries.iter().filter(|e| e.usable).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn blacklisted(&self) -> impl Iterator<Item = &SourceId> {
        self.blacklist.iter()
    }
}
