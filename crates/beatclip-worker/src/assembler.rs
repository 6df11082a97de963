//! Final assembly: ordered lossless join, then the audio track.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use beatclip_media::{AudioAttacher, Concatenator};

use crate::error::{WorkerError, WorkerResult};

const JOINED_FILE: &str = "joined.mp4";

pub struct Assembler {
    concatenator: Arc<dyn Concatenator>,
    attacher: Arc<dyn AudioAttacher>,
}

impl Assembler {
    pub fn new(concatenator: Arc<dyn Concatenator>, attacher: Arc<dyn AudioAttacher>) -> Self {
        Self {
            concatenator,
            attacher,
        }
    }

    /// Join `clips` in order and attach `audio` trimmed to `duration`.
    ///
    /// The intermediate video lives in `work_dir` and is removed afterwards.
    pub async fn assemble(
        &self,
        clips: &[PathBuf],
        audio: &Path,
        duration: f64,
        output: &Path,
        work_dir: &Path,
    ) -> WorkerResult<()> {
        if clips.is_empty() {
            return Err(WorkerError::assembly_failed("no clips to assemble"));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let joined = work_dir.join(JOINED_FILE);
        info!(clips = clips.len(), joined = %joined.display(), "Joining clips");
        self.concatenator
            .join(clips, &joined)
            .await
            .map_err(|e| WorkerError::assembly_failed(format!("concat: {}", e)))?;

        info!(duration, output = %output.display(), "Attaching audio");
        let attached = self.attacher.attach(&joined, audio, duration, output).await;

        if let Err(e) = tokio::fs::remove_file(&joined).await {
            warn!(path = %joined.display(), "Failed to remove joined video: {}", e);
        }

        attached.map_err(|e| WorkerError::assembly_failed(format!("attach audio: {}", e)))
    }
}
