use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::format::{ResolutionScale, ResourceFormat};

pub type FrameOutcomeSender = tokio::sync::mpsc::UnboundedSender<FrameOutcome>;
pub type FrameOutcomeReceiver = tokio::sync::mpsc::UnboundedReceiver<FrameOutcome>;

/// Per-session settings, fixed before the first job is submitted and shared
/// read-only by every job afterwards.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub path: PathBuf,
    pub format: ResourceFormat,
    pub scale: ResolutionScale,
    pub verbose: bool,
}

impl SessionConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: ResourceFormat::default(),
            scale: ResolutionScale::default(),
            verbose: false,
        }
    }

    pub fn with_format(mut self, format: ResourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_scale(mut self, scale: ResolutionScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Admission gate bounding the number of frames in flight.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
}

impl Admission {
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
        }
    }

    pub async fn acquire(&self) -> anyhow::Result<OwnedSemaphorePermit> {
        Ok(self.semaphore.clone().acquire_owned().await?)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.ceiling - self.semaphore.available_permits()
    }
}

/// Everything a frame needs once it has left the driver: the configuration
/// snapshot, where to report completion, and the admission gate it counts
/// against.
#[derive(Debug)]
pub struct CompletionLane {
    config: Arc<SessionConfig>,
    tx: FrameOutcomeSender,
    admission: Option<Admission>,
}

impl CompletionLane {
    pub fn new(
        config: Arc<SessionConfig>,
        tx: FrameOutcomeSender,
        admission: Option<Admission>,
    ) -> Self {
        Self {
            config,
            tx,
            admission,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn in_flight(&self) -> usize {
        self.admission.as_ref().map(|a| a.in_flight()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    /// Single-frame pass that only learns the output dimensions.
    Probe,
    /// Regular frame whose pixels go to the output.
    Decode,
}

/// Unique ownership of one frame travelling through the job chain.
///
/// The ticket moves from the read job into the decode+process job and ends
/// up either settled (emitted or probed) or dropped. Dropping an unsettled
/// ticket reports [`FrameOutcome::Dropped`] and gives back its admission
/// permit, so every failure branch only has to let go of the ticket.
#[derive(Debug)]
pub struct FrameTicket {
    index: u64,
    kind: TicketKind,
    lane: Arc<CompletionLane>,
    permit: Option<OwnedSemaphorePermit>,
    settled: bool,
}

impl FrameTicket {
    pub fn probe(index: u64, lane: Arc<CompletionLane>) -> Self {
        Self {
            index,
            kind: TicketKind::Probe,
            lane,
            permit: None,
            settled: false,
        }
    }

    pub fn decode(index: u64, lane: Arc<CompletionLane>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            index,
            kind: TicketKind::Decode,
            lane,
            permit: Some(permit),
            settled: false,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn kind(&self) -> TicketKind {
        self.kind
    }

    pub fn config(&self) -> &SessionConfig {
        self.lane.config()
    }

    /// Frames currently holding an admission permit, this one included.
    pub fn in_flight(&self) -> usize {
        self.lane.in_flight()
    }

    pub fn emit(mut self, width: u32, height: u32, data: Bytes) {
        self.settled = true;
        let frame = EmittedFrame {
            index: self.index,
            width,
            height,
            data,
            permit: self.permit.take(),
        };
        // A closed receiver means the session is gone; the permit goes with the message.
        let _ = self.lane.tx.send(FrameOutcome::Emitted(frame));
    }

    pub fn probed(mut self, width: u32, height: u32) {
        self.settled = true;
        let _ = self.lane.tx.send(FrameOutcome::Probed {
            index: self.index,
            width,
            height,
        });
    }
}

impl Drop for FrameTicket {
    fn drop(&mut self) {
        if !self.settled {
            log::debug!("frame {} dropped before completion", self.index);
            drop(self.permit.take());
            let _ = self.lane.tx.send(FrameOutcome::Dropped { index: self.index });
        }
    }
}

#[derive(Debug)]
pub enum FrameOutcome {
    Emitted(EmittedFrame),
    Probed { index: u64, width: u32, height: u32 },
    Dropped { index: u64 },
}

impl FrameOutcome {
    pub fn index(&self) -> u64 {
        match self {
            FrameOutcome::Emitted(frame) => frame.index,
            FrameOutcome::Probed { index, .. } => *index,
            FrameOutcome::Dropped { index } => *index,
        }
    }
}

/// Decoded bytes of one frame. Holds the frame's admission permit until the
/// output has consumed it.
#[derive(Debug)]
pub struct EmittedFrame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
    permit: Option<OwnedSemaphorePermit>,
}

impl EmittedFrame {
    pub fn release(&mut self) {
        self.permit.take();
    }
}
