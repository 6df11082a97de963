//! FFmpeg video filter definitions for one-second clips.

use std::path::Path;

/// Letterbox into a `width`x`height` frame: fit inside, pad with black.
pub fn letterbox(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1",
        w = width,
        h = height
    )
}

/// Change playback speed (`2.0` plays twice as fast).
pub fn speed(multiplier: f64) -> String {
    format!("setpts=PTS/{:.4}", multiplier)
}

/// Repeat the last frame so slowed or short sources still fill `seconds`.
pub fn hold_last_frame(seconds: f64) -> String {
    format!("tpad=stop_mode=clone:stop_duration={:.3}", seconds)
}

/// Constant output frame rate.
pub fn frame_rate(fps: u32) -> String {
    format!("fps={}", fps)
}

/// Caption drawn from a text file.
#[derive(Debug, Clone)]
pub struct DrawText<'a> {
    /// File holding the caption (read verbatim, no `%` expansion)
    pub textfile: &'a Path,
    pub font_size: u32,
    pub font_file: Option<&'a Path>,
    pub border_width: u32,
    /// Vertical centre of the text as a fraction of frame height
    pub vertical_position: f64,
}

/// Build a `drawtext` filter.
pub fn drawtext(spec: &DrawText<'_>) -> String {
    let mut filter = format!(
        "drawtext=textfile='{}':expansion=none:fontsize={}:fontcolor=white:borderw={}:bordercolor=black:line_spacing=12:x=(w-text_w)/2:y=h*{:.3}-text_h/2",
        escape_filter_path(spec.textfile),
        spec.font_size,
        spec.border_width,
        spec.vertical_position
    );
    if let Some(font) = spec.font_file {
        filter.push_str(&format!(":fontfile='{}'", escape_filter_path(font)));
    }
    filter
}

/// Full filter chain for one output second.
///
/// Order: speed change, letterbox, optional caption, pad to length, frame rate.
pub fn second_chain(
    width: u32,
    height: u32,
    fps: u32,
    multiplier: f64,
    caption: Option<&DrawText<'_>>,
) -> String {
    let mut chain = vec![speed(multiplier), letterbox(width, height)];
    if let Some(caption) = caption {
        chain.push(drawtext(caption));
    }
    chain.push(hold_last_frame(1.0));
    chain.push(frame_rate(fps));
    chain.join(",")
}

/// Escape a path for use inside a single-quoted filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ':' => escaped.push_str("\\:"),
            '\'' => escaped.push_str("'\\''"),
            _ => escaped.push(c),
        }
    }
    escaped
}
