//! `RCLP` clip files: a fixed header followed by uncompressed 16-bit RGB frames.
//!
//! Layout, little-endian:
//!
//! ```text
//! magic "RCLP" | version u16 | width u32 | height u32 | frame_rate f32 | frame_count u32
//! frame 0: width * height * 3 u16 samples (R, G, B interleaved)
//! frame 1: ...
//! ```

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::engine::EngineError;

pub const MAGIC: &[u8; 4] = b"RCLP";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: u64 = 22;
const FRAME_COUNT_OFFSET: u64 = 18;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipHeader {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    pub frame_count: u32,
}

impl ClipHeader {
    /// Length of the whole file, `None` when it does not fit in a `u64`.
    pub fn clip_len(&self) -> Option<u64> {
        (self.width as u64)
            .checked_mul(self.height as u64)?
            .checked_mul(6)?
            .checked_mul(self.frame_count as u64)?
            .checked_add(HEADER_LEN)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::InvalidClip(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(EngineError::InvalidClip(format!(
                "invalid frame rate {}",
                self.frame_rate
            )));
        }
        // a single frame must be addressable in memory
        let frame_len = (self.width as u64)
            .checked_mul(self.height as u64)
            .and_then(|pixels| pixels.checked_mul(6))
            .filter(|len| usize::try_from(*len).is_ok());
        if frame_len.is_none() || self.clip_len().is_none() {
            return Err(EngineError::InvalidClip(format!(
                "frame size {}x{} with {} frames is too large",
                self.width, self.height, self.frame_count
            )));
        }
        Ok(())
    }

    pub fn samples_per_frame(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn frame_len(&self) -> u64 {
        self.samples_per_frame() as u64 * 2
    }

    pub fn frame_offset(&self, index: u64) -> u64 {
        HEADER_LEN + index * self.frame_len()
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, EngineError> {
        let mut buf = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;
        if &buf[0..4] != MAGIC {
            return Err(EngineError::InvalidClip("bad magic".to_string()));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != VERSION {
            return Err(EngineError::InvalidClip(format!(
                "unsupported version {}",
                version
            )));
        }
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let header = Self {
            width: u32_at(6),
            height: u32_at(10),
            frame_rate: f32::from_bits(u32_at(14)),
            frame_count: u32_at(18),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&self.width.to_le_bytes())?;
        writer.write_all(&self.height.to_le_bytes())?;
        writer.write_all(&self.frame_rate.to_le_bytes())?;
        writer.write_all(&self.frame_count.to_le_bytes())?;
        Ok(())
    }
}

/// Random access to the frames of an open clip file.
#[derive(Debug)]
pub struct ClipSource {
    header: ClipHeader,
    file: Mutex<File>,
}

impl ClipSource {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let mut file = File::open(path)?;
        let header = ClipHeader::read_from(&mut file)?;

        let len = file.metadata()?.len();
        let expected = header.clip_len().unwrap_or(u64::MAX);
        if len < expected {
            return Err(EngineError::InvalidClip(format!(
                "{} is truncated: {} bytes, header needs {}",
                path.display(),
                len,
                expected
            )));
        }

        Ok(Self {
            header,
            file: Mutex::new(file),
        })
    }

    pub fn header(&self) -> &ClipHeader {
        &self.header
    }

    pub fn read_frame(&self, index: u64) -> Result<Vec<u16>, EngineError> {
        let count = self.header.frame_count as u64;
        if index >= count {
            return Err(EngineError::FrameOutOfRange { index, count });
        }

        let mut raw = vec![0u8; self.header.frame_len() as usize];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.header.frame_offset(index)))?;
            file.read_exact(&mut raw)?;
        }

        Ok(raw
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}

/// Writes an `RCLP` file frame by frame.
pub struct ClipWriter {
    inner: BufWriter<File>,
    header: ClipHeader,
}

impl ClipWriter {
    pub fn create(path: &Path, width: u32, height: u32, frame_rate: f32) -> anyhow::Result<Self> {
        let header = ClipHeader {
            width,
            height,
            frame_rate,
            frame_count: 0,
        };
        header.validate()?;
        let mut inner = BufWriter::new(File::create(path)?);
        header.write_to(&mut inner)?;
        Ok(Self { inner, header })
    }

    /// `samples` holds `width * height` interleaved R, G, B triples.
    pub fn write_frame(&mut self, samples: &[u16]) -> anyhow::Result<()> {
        if samples.len() != self.header.samples_per_frame() {
            anyhow::bail!(
                "frame has {} samples, expected {}",
                samples.len(),
                self.header.samples_per_frame()
            );
        }
        let frame_count = self
            .header
            .frame_count
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("clip already holds {} frames", u32::MAX))?;
        for sample in samples {
            self.inner.write_all(&sample.to_le_bytes())?;
        }
        self.header.frame_count = frame_count;
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<ClipHeader> {
        self.inner
            .seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        self.inner
            .write_all(&self.header.frame_count.to_le_bytes())?;
        self.inner.flush()?;
        Ok(self.header)
    }
}
