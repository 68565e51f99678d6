//! Clip metadata learned while opening a session.

use std::fmt;
use std::path::PathBuf;

use crate::format::{ResolutionScale, ResourceFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub path: PathBuf,
    /// Output width at the session scale, from the info pass.
    pub width: u32,
    /// Output height at the session scale, from the info pass.
    pub height: u32,
    pub frame_rate: f32,
    pub frame_count: u64,
    pub scale: ResolutionScale,
}

impl ClipInfo {
    /// Bytes written per frame in `format`.
    pub fn frame_size(&self, format: ResourceFormat) -> usize {
        format.frame_size(self.width, self.height)
    }

    /// Input options for ffmpeg reading the raw output from a pipe.
    ///
    /// Float layouts have no ffmpeg pixel format and are rejected.
    pub fn ffmpeg_input_format(&self, format: ResourceFormat) -> anyhow::Result<String> {
        let pixel_format = format
            .ffmpeg_pixel_format()
            .ok_or_else(|| anyhow::anyhow!("FFmpeg format unknown for: {}", format))?;

        let mut args = format!(
            "-f rawvideo -pixel_format {} -s {}x{} -r {:.6} -i pipe:0 ",
            pixel_format, self.width, self.height, self.frame_rate
        );
        // planes come out R,G,B; gbrp expects G,B,R
        if format.is_planar() {
            args.push_str("-filter:v colorchannelmixer=0:1:0:0:0:0:1:0:1:0:0:0 ");
        }
        Ok(args)
    }
}

/// Six significant digits with trailing zeros removed, `%g` style.
fn significant(value: f32) -> String {
    let value = value as f64;
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    if !(-5..6).contains(&exponent) {
        return format!("{:.5e}", value);
    }
    let decimals = (5 - exponent).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

impl fmt::Display for ClipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Braw Decoder: Alpha")?;
        writeln!(f, "File: {}", self.path.display())?;
        writeln!(f, "Resolution: {}x{}", self.width, self.height)?;
        writeln!(f, "Framerate: {}", significant(self.frame_rate))?;
        writeln!(f, "Frame Count: {}", self.frame_count)?;
        writeln!(f, "Scale: {}", self.scale)
    }
}
