//! Single writer draining the completion channel into the output stream.

use std::collections::BTreeMap;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::context::{EmittedFrame, FrameOutcome, FrameOutcomeReceiver};

/// Order in which decoded frames reach the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitOrder {
    /// Write each frame as soon as its decode finishes.
    #[default]
    AsCompleted,
    /// Park early frames until every lower frame index was written or dropped.
    FrameIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub submitted: u64,
    pub emitted: u64,
    pub dropped: u64,
    pub bytes_written: u64,
}

pub struct OutputWriter<'a, W> {
    out: &'a mut W,
    order: EmitOrder,
    next_index: u64,
    parked: BTreeMap<u64, Option<EmittedFrame>>,
    report: DecodeReport,
    failure: Option<std::io::Error>,
    on_failure: CancellationToken,
}

impl<'a, W: AsyncWrite + Unpin> OutputWriter<'a, W> {
    /// `first_index` is the lowest frame index the session will submit.
    pub fn new(out: &'a mut W, order: EmitOrder, first_index: u64) -> Self {
        Self {
            out,
            order,
            next_index: first_index,
            parked: BTreeMap::new(),
            report: DecodeReport::default(),
            failure: None,
            on_failure: CancellationToken::new(),
        }
    }

    /// Token cancelled the first time writing to the output fails.
    pub fn with_failure_token(mut self, token: CancellationToken) -> Self {
        self.on_failure = token;
        self
    }

    /// Runs until every sender of `rx` is gone.
    pub async fn run(mut self, mut rx: FrameOutcomeReceiver) -> anyhow::Result<DecodeReport> {
        while let Some(outcome) = rx.recv().await {
            self.accept(outcome).await;
        }

        // gaps left by frames that were never submitted
        let parked = std::mem::take(&mut self.parked);
        for frame in parked.into_values().flatten() {
            self.write(frame).await;
        }

        if self.failure.is_none() {
            if let Err(e) = self.out.flush().await {
                self.failure = Some(e);
            }
        }

        match self.failure {
            Some(e) => Err(anyhow::Error::new(e).context("write decoded frames to output")),
            None => Ok(self.report),
        }
    }

    async fn accept(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Emitted(frame) => match self.order {
                EmitOrder::AsCompleted => self.write(frame).await,
                EmitOrder::FrameIndex => {
                    self.parked.insert(frame.index, Some(frame));
                    self.write_ready().await;
                }
            },
            FrameOutcome::Dropped { index } => {
                self.report.dropped += 1;
                if self.order == EmitOrder::FrameIndex {
                    self.parked.insert(index, None);
                    self.write_ready().await;
                }
            }
            FrameOutcome::Probed { index, .. } => {
                log::debug!("ignoring probe result of frame {} in output", index);
            }
        }
    }

    async fn write_ready(&mut self) {
        while let Some(entry) = self.parked.remove(&self.next_index) {
            self.next_index += 1;
            if let Some(frame) = entry {
                self.write(frame).await;
            }
        }
    }

    async fn write(&mut self, mut frame: EmittedFrame) {
        if self.failure.is_none() {
            match self.out.write_all(&frame.data).await {
                Ok(()) => {
                    self.report.emitted += 1;
                    self.report.bytes_written += frame.data.len() as u64;
                }
                Err(e) => {
                    log::error!("write frame {} error: {}", frame.index, e);
                    self.failure = Some(e);
                    self.on_failure.cancel();
                }
            }
        }
        frame.release();
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;
