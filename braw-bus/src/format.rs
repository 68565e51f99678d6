//! Output pixel layouts and decode-time downscaling factors.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} {value:?}, expected one of: {expected}")]
pub struct ParseSelectorError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

/// Pixel layout and bit depth the engine is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceFormat {
    /// Packed 8-bit RGBA.
    #[default]
    RgbaU8,
    /// Packed 8-bit BGRA.
    BgraU8,
    /// Interleaved 16-bit RGB.
    RgbU16,
    /// Planar 16-bit RGB (R plane, G plane, B plane).
    RgbU16Planar,
    /// Interleaved 32-bit float RGB.
    RgbF32,
    /// Planar 32-bit float RGB.
    RgbF32Planar,
    /// Interleaved 32-bit float BGRA.
    BgraF32,
}

impl ResourceFormat {
    pub const ALL: [ResourceFormat; 7] = [
        ResourceFormat::RgbaU8,
        ResourceFormat::BgraU8,
        ResourceFormat::RgbU16,
        ResourceFormat::RgbU16Planar,
        ResourceFormat::RgbF32,
        ResourceFormat::RgbF32Planar,
        ResourceFormat::BgraF32,
    ];

    /// Command line selector, e.g. "16pl".
    pub fn selector(&self) -> &'static str {
        match self {
            ResourceFormat::RgbaU8 => "rgba",
            ResourceFormat::BgraU8 => "bgra",
            ResourceFormat::RgbU16 => "16il",
            ResourceFormat::RgbU16Planar => "16pl",
            ResourceFormat::RgbF32 => "f32s",
            ResourceFormat::RgbF32Planar => "f32p",
            ResourceFormat::BgraF32 => "f32a",
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ResourceFormat::RgbaU8 | ResourceFormat::BgraU8 => 4,
            ResourceFormat::RgbU16 | ResourceFormat::RgbU16Planar => 6,
            ResourceFormat::RgbF32 | ResourceFormat::RgbF32Planar => 12,
            ResourceFormat::BgraF32 => 16,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            ResourceFormat::RgbF32 | ResourceFormat::RgbF32Planar | ResourceFormat::BgraF32
        )
    }

    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            ResourceFormat::RgbU16Planar | ResourceFormat::RgbF32Planar
        )
    }

    /// Matching ffmpeg `-pixel_format` name. Float layouts have none.
    pub fn ffmpeg_pixel_format(&self) -> Option<&'static str> {
        match self {
            ResourceFormat::RgbaU8 => Some("rgba"),
            ResourceFormat::BgraU8 => Some("bgra"),
            ResourceFormat::RgbU16 => Some("rgb48le"),
            ResourceFormat::RgbU16Planar => Some("gbrp16le"),
            _ => None,
        }
    }

    /// Size in bytes of one frame of `width` x `height` pixels.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl fmt::Display for ResourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

impl FromStr for ResourceFormat {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceFormat::ALL
            .into_iter()
            .find(|format| format.selector() == s)
            .ok_or_else(|| ParseSelectorError {
                kind: "color format",
                value: s.to_string(),
                expected: "rgba, bgra, 16il, 16pl, f32s, f32p, f32a",
            })
    }
}

/// Downsampling applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolutionScale {
    #[default]
    Full,
    Half,
    Quarter,
    Eighth,
}

impl ResolutionScale {
    pub fn factor(&self) -> u32 {
        match self {
            ResolutionScale::Full => 1,
            ResolutionScale::Half => 2,
            ResolutionScale::Quarter => 4,
            ResolutionScale::Eighth => 8,
        }
    }

    /// Output dimensions for a sensor of `width` x `height`.
    pub fn apply(&self, width: u32, height: u32) -> (u32, u32) {
        (width / self.factor(), height / self.factor())
    }
}

impl fmt::Display for ResolutionScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factor())
    }
}

impl TryFrom<u32> for ResolutionScale {
    type Error = ParseSelectorError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ResolutionScale::Full),
            2 => Ok(ResolutionScale::Half),
            4 => Ok(ResolutionScale::Quarter),
            8 => Ok(ResolutionScale::Eighth),
            other => Err(ParseSelectorError {
                kind: "scale",
                value: other.to_string(),
                expected: "1, 2, 4, 8",
            }),
        }
    }
}

impl FromStr for ResolutionScale {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let factor = s.parse::<u32>().map_err(|_| ParseSelectorError {
            kind: "scale",
            value: s.to_string(),
            expected: "1, 2, 4, 8",
        })?;
        ResolutionScale::try_from(factor)
    }
}
