//! FFmpeg-backed one-second renderer.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use beatclip_models::CaptionMode;

use crate::capability::{Overlay, RenderError, RenderRequest, SecondRenderer};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaError;
use crate::filters::{self, DrawText};
use crate::fs_utils::{move_file, partial_sibling};
use crate::probe::probe_video;

/// Output format and caption styling for rendered seconds.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// x264 preset
    pub preset: String,
    pub crf: u8,
    /// Seconds of source read per output second, before speed change
    pub window_secs: f64,
    pub font_file: Option<PathBuf>,
    pub phrase_font_size: u32,
    pub karaoke_font_size: u32,
    pub text_border: u32,
    /// Vertical centre of captions as a fraction of frame height
    pub text_position: f64,
    /// Kill a single render after this many seconds
    pub timeout_secs: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            preset: "ultrafast".to_string(),
            crf: 23,
            window_secs: 1.2,
            font_file: None,
            phrase_font_size: 120,
            karaoke_font_size: 80,
            text_border: 8,
            text_position: 0.25,
            timeout_secs: 120,
        }
    }
}

impl RenderSettings {
    /// Create settings from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            width: env_parse("BEATCLIP_WIDTH", defaults.width),
            height: env_parse("BEATCLIP_HEIGHT", defaults.height),
            fps: env_parse("BEATCLIP_FPS", defaults.fps),
            preset: std::env::var("BEATCLIP_X264_PRESET").unwrap_or(defaults.preset),
            crf: env_parse("BEATCLIP_CRF", defaults.crf),
            window_secs: env_parse("BEATCLIP_WINDOW_SECS", defaults.window_secs),
            font_file: std::env::var("BEATCLIP_FONT_FILE").ok().map(PathBuf::from),
            phrase_font_size: env_parse("BEATCLIP_PHRASE_FONT_SIZE", defaults.phrase_font_size),
            karaoke_font_size: env_parse("BEATCLIP_KARAOKE_FONT_SIZE", defaults.karaoke_font_size),
            text_border: env_parse("BEATCLIP_TEXT_BORDER", defaults.text_border),
            text_position: env_parse("BEATCLIP_TEXT_POSITION", defaults.text_position),
            timeout_secs: env_parse("BEATCLIP_RENDER_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }

    fn font_size(&self, mode: CaptionMode) -> u32 {
        match mode {
            CaptionMode::Phrase => self.phrase_font_size,
            CaptionMode::Karaoke => self.karaoke_font_size,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Renders seconds with the FFmpeg CLI.
#[derive(Clone)]
pub struct FfmpegSecondRenderer {
    settings: RenderSettings,
    runner: FfmpegRunner,
}

impl FfmpegSecondRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        let runner = FfmpegRunner::new().with_timeout(settings.timeout_secs);
        Self { settings, runner }
    }

    /// Kill in-flight FFmpeg processes when the signal flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: tokio::sync::watch::Receiver<bool>) -> Self {
        self.runner = self.runner.with_cancel(cancel_rx);
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Build the FFmpeg command for a request.
    ///
    /// `caption_file` must already hold the overlay text when the request
    /// carries an overlay.
    pub fn build_command(
        &self,
        request: &RenderRequest,
        partial: &Path,
        caption_file: Option<&Path>,
    ) -> FfmpegCommand {
        let s = &self.settings;
        let caption = match (&request.overlay, caption_file) {
            (Some(overlay), Some(textfile)) => Some(DrawText {
                textfile,
                font_size: s.font_size(overlay.mode),
                font_file: s.font_file.as_deref(),
                border_width: s.text_border,
                vertical_position: s.text_position,
            }),
            _ => None,
        };

        FfmpegCommand::new(&request.source, partial)
            .seek(request.offset.max(0.0))
            .duration(s.window_secs)
            .video_filter(filters::second_chain(
                s.width,
                s.height,
                s.fps,
                request.speed,
                caption.as_ref(),
            ))
            .output_duration(1.0)
            .no_audio()
            .video_codec("libx264")
            .preset(s.preset.clone())
            .crf(s.crf)
            .pixel_format("yuv420p")
    }

    async fn write_caption(&self, overlay: &Overlay, output: &Path) -> Result<PathBuf, RenderError> {
        let path = output.with_extension("caption.txt");
        tokio::fs::write(&path, overlay.text.as_bytes())
            .await
            .map_err(|e| RenderError::OverlayFailed(format!("caption file: {}", e)))?;
        Ok(path)
    }
}

#[async_trait]
impl SecondRenderer for FfmpegSecondRenderer {
    async fn probe_duration(&self, source: &Path) -> Result<f64, RenderError> {
        let info = probe_video(source)
            .await
            .map_err(|e| RenderError::classify(e, false))?;
        Ok(info.duration)
    }

    async fn render(&self, request: &RenderRequest) -> Result<PathBuf, RenderError> {
        let partial = partial_sibling(&request.output);
        let caption_file = match &request.overlay {
            Some(overlay) => Some(self.write_caption(overlay, &request.output).await?),
            None => None,
        };

        let cmd = self.build_command(request, &partial, caption_file.as_deref());
        debug!(
            second = request.second_index,
            source = %request.source.display(),
            offset = request.offset,
            speed = request.speed,
            overlay = request.overlay.is_some(),
            "Rendering second"
        );

        let result = self.runner.run(&cmd).await;

        if let Some(path) = &caption_file {
            let _ = tokio::fs::remove_file(path).await;
        }

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(RenderError::classify(e, request.overlay.is_some()));
        }

        move_file(&partial, &request.output)
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;
        Ok(request.output.clone())
    }

    async fn render_fallback(&self, second_index: usize, output: &Path) -> Result<PathBuf, RenderError> {
        let s = &self.settings;
        let partial = partial_sibling(output);
        let cmd = FfmpegCommand::lavfi(
            format!("color=c=black:s={}x{}:r={}:d=1", s.width, s.height, s.fps),
            &partial,
        )
        .output_duration(1.0)
        .video_codec("libx264")
        .preset(s.preset.clone())
        .crf(s.crf)
        .pixel_format("yuv420p");

        if let Err(e) = self.runner.run(&cmd).await {
            let _ = tokio::fs::remove_file(&partial).await;
            warn!(second = second_index, "Fallback frame render failed: {}", e);
            return Err(match e {
                MediaError::Cancelled => RenderError::Cancelled,
                other => RenderError::Unavailable(other.to_string()),
            });
        }

        move_file(&partial, output)
            .await
            .map_err(|e| RenderError::Unavailable(e.to_string()))?;
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(overlay: Option<Overlay>) -> RenderRequest {
        RenderRequest {
            second_index: 3,
            source: PathBuf::from("/bank/a.mp4"),
            offset: 2.5,
            speed: 1.25,
            overlay,
            output: PathBuf::from("/ckpt/clip_000003.mp4"),
        }
    }

    #[test]
    fn test_build_command_without_caption() {
        let renderer = FfmpegSecondRenderer::new(RenderSettings::default());
        let partial = partial_sibling(Path::new("/ckpt/clip_000003.mp4"));
        let args = renderer.build_command(&request(None), &partial, None).build_args();

        assert!(args.contains(&"2.500".to_string()));
        assert!(args.contains(&"1.200".to_string()));
        assert!(args.contains(&"-an".to_string()));
        assert!(args.contains(&"ultrafast".to_string()));
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].contains("setpts=PTS/1.2500"));
        assert!(!args[vf + 1].contains("drawtext"));
        assert_eq!(args.last().unwrap(), "/ckpt/.clip_000003.partial.mp4");
    }

    #[test]
    fn test_build_command_karaoke_font_size() {
        let renderer = FfmpegSecondRenderer::new(RenderSettings::default());
        let overlay = Overlay {
            text: "HELLO WORLD".to_string(),
            mode: CaptionMode::Karaoke,
        };
        let partial = PathBuf::from("/ckpt/.p.mp4");
        let caption = PathBuf::from("/ckpt/clip_000003.caption.txt");
        let args = renderer
            .build_command(&request(Some(overlay)), &partial, Some(&caption))
            .build_args();
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].contains("fontsize=80"));
        assert!(args[vf + 1].contains("clip_000003.caption.txt"));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_render_fallback_frame() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = RenderSettings {
            width: 108,
            height: 192,
            ..Default::default()
        };
        let renderer = FfmpegSecondRenderer::new(settings);
        let out = dir.path().join("clip_000000.mp4");
        let path = renderer.render_fallback(0, &out).await.unwrap();
        assert!(path.exists());
        let duration = renderer.probe_duration(&path).await.unwrap();
        assert!((duration - 1.0).abs() < 0.1);
    }
}
