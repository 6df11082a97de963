//! Lossless concatenation and audio attachment.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::capability::{AudioAttacher, Concatenator};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, partial_sibling};

/// Render the concat demuxer list for `clips`.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Joins clips with the FFmpeg concat demuxer and stream copy.
#[derive(Clone, Default)]
pub struct FfmpegConcatenator {
    runner: FfmpegRunner,
}

impl FfmpegConcatenator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Concatenator for FfmpegConcatenator {
    async fn join(&self, clips: &[PathBuf], output: &Path) -> MediaResult<()> {
        if clips.is_empty() {
            return Err(MediaError::EmptyConcat);
        }

        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;

        // Removed when dropped
        let list = tempfile::Builder::new()
            .prefix(".concat-")
            .suffix(".txt")
            .tempfile_in(dir)?;
        tokio::fs::write(list.path(), concat_list(clips)).await?;

        let partial = partial_sibling(output);
        let cmd = FfmpegCommand::new(list.path(), &partial)
            .input_args(["-f", "concat", "-safe", "0"])
            .codec_copy()
            .faststart();

        info!(clips = clips.len(), output = %output.display(), "Concatenating clips");
        if let Err(e) = self.runner.run(&cmd).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        move_file(&partial, output).await
    }
}

/// Muxes audio onto a joined video with FFmpeg.
#[derive(Clone)]
pub struct FfmpegAudioAttacher {
    runner: FfmpegRunner,
    audio_codec: String,
    audio_bitrate: String,
}

impl Default for FfmpegAudioAttacher {
    fn default() -> Self {
        Self {
            runner: FfmpegRunner::new(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
        }
    }
}

impl FfmpegAudioAttacher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(mut self, runner: FfmpegRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn build_command(&self, video: &Path, audio: &Path, duration: f64, partial: &Path) -> FfmpegCommand {
        FfmpegCommand::new(video, partial)
            .add_input(audio)
            .map("0:v:0")
            .map("1:a:0")
            .video_codec("copy")
            .audio_codec(self.audio_codec.clone())
            .output_args(["-b:a", self.audio_bitrate.as_str()])
            .output_duration(duration)
            .faststart()
    }
}

#[async_trait]
impl AudioAttacher for FfmpegAudioAttacher {
    async fn attach(&self, video: &Path, audio: &Path, duration: f64, output: &Path) -> MediaResult<()> {
        for input in [video, audio] {
            if !input.exists() {
                return Err(MediaError::FileNotFound(input.to_path_buf()));
            }
        }

        let partial = partial_sibling(output);
        let cmd = self.build_command(video, audio, duration, &partial);

        info!(duration, output = %output.display(), "Attaching audio");
        let result = self
            .runner
            .run_with_progress(&cmd, move |progress| {
                debug!(
                    fraction = progress.fraction_of(duration),
                    speed = progress.speed,
                    "Audio mux progress"
                );
            })
            .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        move_file(&partial, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_quotes_paths() {
        let clips = vec![
            PathBuf::from("/ckpt/clip_000000.mp4"),
            PathBuf::from("/ckpt/it's/clip_000001.mp4"),
        ];
        let list = concat_list(&clips);
        assert_eq!(
            list,
            "file '/ckpt/clip_000000.mp4'\nfile '/ckpt/it'\\''s/clip_000001.mp4'\n"
        );
    }

    #[test]
    fn test_attach_command_trims_and_maps() {
        let attacher = FfmpegAudioAttacher::new();
        let args = attacher
            .build_command(
                Path::new("joined.mp4"),
                Path::new("song.mp3"),
                42.0,
                Path::new(".out.partial.mp4"),
            )
            .build_args();

        let t = args.iter().rposition(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "42.000");
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "copy"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "1:a:0"));
    }

    #[tokio::test]
    async fn test_join_rejects_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = FfmpegConcatenator::new()
            .join(&[], &dir.path().join("out.mp4"))
            .await;
        assert!(matches!(result, Err(MediaError::EmptyConcat)));
    }

    #[tokio::test]
    async fn test_attach_requires_inputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = FfmpegAudioAttacher::new()
            .attach(
                &dir.path().join("missing.mp4"),
                &dir.path().join("song.mp3"),
                10.0,
                &dir.path().join("out.mp4"),
            )
            .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
