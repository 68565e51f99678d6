//! Session lifecycle: open a clip, learn its output geometry, decode a frame
//! range through the engine, flush, close.

use std::ops::Range;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncWrite;
use tokio::runtime::RuntimeFlavor;
use tokio_util::sync::CancellationToken;

use crate::{
    context::{Admission, CompletionLane, FrameOutcome, FrameTicket, SessionConfig},
    engine::{Clip, Codec},
    metadata::ClipInfo,
    processor::FrameProcessor,
    sink::{DecodeReport, EmitOrder, OutputWriter},
};

pub const DEFAULT_CEILING: usize = 3;

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// First frame to decode.
    pub start: u64,
    /// One past the last frame; 0 means the whole clip.
    pub end: u64,
    /// Maximum number of frames in flight.
    pub ceiling: usize,
    pub order: EmitOrder,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            ceiling: DEFAULT_CEILING,
            order: EmitOrder::default(),
        }
    }
}

impl DecodeOptions {
    pub fn frame_range(&self, frame_count: u64) -> Range<u64> {
        let end = if self.end == 0 {
            frame_count
        } else {
            self.end.min(frame_count)
        };
        self.start.min(end)..end
    }
}

pub struct Session<C: Codec<FrameTicket>> {
    clip: Option<C::Clip>,
    codec: Arc<C>,
    config: Arc<SessionConfig>,
    info: ClipInfo,
}

impl<C: Codec<FrameTicket> + 'static> Session<C> {
    /// Opens the clip, registers the frame callbacks and runs the info pass.
    pub async fn open(codec: Arc<C>, config: SessionConfig) -> anyhow::Result<Self> {
        let clip = codec
            .open_clip(&config.path)
            .with_context(|| format!("failed to open clip {}", config.path.display()))?;
        codec.set_callback(Arc::new(FrameProcessor::new()));

        let frame_count = clip.frame_count();
        let frame_rate = clip.frame_rate();
        if frame_count == 0 {
            anyhow::bail!("clip {} has no frames", config.path.display());
        }

        let info = ClipInfo {
            path: config.path.clone(),
            width: 0,
            height: 0,
            frame_rate,
            frame_count,
            scale: config.scale,
        };
        let mut session = Self {
            clip: Some(clip),
            codec,
            config: Arc::new(config),
            info,
        };

        let (width, height) = session.probe().await?;
        session.info.width = width;
        session.info.height = height;
        log::info!(
            "session open: {} frames at {} fps, output {}x{}",
            frame_count,
            frame_rate,
            width,
            height
        );
        Ok(session)
    }

    pub fn info(&self) -> &ClipInfo {
        &self.info
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn clip(&self) -> anyhow::Result<&C::Clip> {
        self.clip
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("session is closed"))
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || codec.flush_jobs())
            .await
            .context("flush jobs")
    }

    /// Decodes frame 0 alone to learn the output dimensions.
    async fn probe(&self) -> anyhow::Result<(u32, u32)> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let lane = Arc::new(CompletionLane::new(self.config.clone(), tx, None));
        let ticket = FrameTicket::probe(0, lane);

        let job = match self.clip()?.create_read_job(0, ticket) {
            Ok(job) => job,
            Err(e) => anyhow::bail!("create info read job: {}", e.error),
        };
        if let Err(e) = job.submit() {
            anyhow::bail!("submit info read job: {}", e.error);
        }
        self.flush().await?;

        while let Ok(outcome) = rx.try_recv() {
            if let FrameOutcome::Probed { width, height, .. } = outcome {
                return Ok((width, height));
            }
        }
        anyhow::bail!("info pass produced no image")
    }

    /// Decodes the configured frame range into `out`.
    ///
    /// Frames that fail anywhere in the job chain are skipped and counted in
    /// [`DecodeReport::dropped`]. Returns only after every submitted job has
    /// completed. Cancelling `cancel` stops admitting new frames.
    pub async fn decode<W: AsyncWrite + Unpin>(
        &self,
        options: &DecodeOptions,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> anyhow::Result<DecodeReport> {
        let range = options.frame_range(self.info.frame_count);
        let admission = Admission::new(options.ceiling);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let lane = Arc::new(CompletionLane::new(
            self.config.clone(),
            tx,
            Some(admission.clone()),
        ));

        log::info!(
            "decode frames {}..{} of {} bytes, at most {} in flight, {:?}",
            range.start,
            range.end,
            self.info.frame_size(self.config.format),
            admission.ceiling(),
            options.order
        );

        let stop = cancel.child_token();
        let writer =
            OutputWriter::new(out, options.order, range.start).with_failure_token(stop.clone());
        let (submitted, written) = tokio::join!(
            self.submit_range(range, lane, admission, stop),
            writer.run(rx)
        );

        let submitted = submitted?;
        let mut report = written?;
        report.submitted = submitted;
        log::info!(
            "decode finished: {} submitted, {} written, {} dropped",
            report.submitted,
            report.emitted,
            report.dropped
        );
        Ok(report)
    }

    async fn submit_range(
        &self,
        range: Range<u64>,
        lane: Arc<CompletionLane>,
        admission: Admission,
        stop: CancellationToken,
    ) -> anyhow::Result<u64> {
        let clip = self.clip()?;
        let mut submitted = 0;

        for index in range {
            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    log::info!("stop submitting at frame {}", index);
                    break;
                }
                permit = admission.acquire() => permit?,
            };

            let ticket = FrameTicket::decode(index, lane.clone(), permit);
            let job = match clip.create_read_job(index, ticket) {
                Ok(job) => job,
                Err(e) => {
                    log::warn!("create read job for frame {} failed: {}", index, e.error);
                    continue;
                }
            };
            if let Err(e) = job.submit() {
                log::warn!("submit read job for frame {} failed: {}", index, e.error);
                continue;
            }
            submitted += 1;
        }

        // the writer finishes once the last ticket is gone
        drop(lane);
        self.flush().await?;
        Ok(submitted)
    }

    /// Flushes outstanding jobs, then releases the clip before the codec.
    ///
    /// Dropping an open session flushes too, but blocks the calling thread
    /// while doing so; async callers should close explicitly.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.flush().await?;
        self.clip.take();
        log::info!("session closed: {}", self.config.path.display());
        Ok(())
    }
}

impl<C: Codec<FrameTicket>> Drop for Session<C> {
    fn drop(&mut self) {
        if self.clip.is_none() {
            return;
        }
        let multi_thread = tokio::runtime::Handle::try_current()
            .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if multi_thread {
            tokio::task::block_in_place(|| self.codec.flush_jobs());
        } else {
            self.codec.flush_jobs();
        }
        self.clip.take();
    }
}

#[cfg(test)]
#[path = "driver_test.rs"]
mod driver_test;
