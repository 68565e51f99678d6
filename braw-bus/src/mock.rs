//! Scripted engine for driving sessions in tests.
//!
//! Every submitted job runs on its own thread after a per-frame delay, and
//! failures can be injected at each step of the chain.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    context::{FrameTicket, TicketKind},
    engine::{
        Callback, Clip, Codec, EngineError, Frame, Job, JobError, JobHandle, JobKind,
        ProcessedImage,
    },
    format::{ResolutionScale, ResourceFormat},
};

pub type DelayFn = Arc<dyn Fn(u64) -> Duration + Send + Sync>;

#[derive(Clone)]
pub struct Script {
    pub frame_count: u64,
    pub frame_rate: f32,
    pub width: u32,
    pub height: u32,
    pub fail_open: bool,
    pub fail_read_create: HashSet<u64>,
    pub fail_read_submit: HashSet<u64>,
    pub fail_read: HashSet<u64>,
    pub fail_configure: HashSet<u64>,
    pub fail_decode_create: HashSet<u64>,
    pub fail_decode_submit: HashSet<u64>,
    pub fail_process: HashSet<u64>,
    /// Frames whose image reports a different resource format than requested.
    pub wrong_format: HashSet<u64>,
    pub delay: DelayFn,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            frame_count: 10,
            frame_rate: 24.0,
            width: 8,
            height: 4,
            fail_open: false,
            fail_read_create: HashSet::new(),
            fail_read_submit: HashSet::new(),
            fail_read: HashSet::new(),
            fail_configure: HashSet::new(),
            fail_decode_create: HashSet::new(),
            fail_decode_submit: HashSet::new(),
            fail_process: HashSet::new(),
            wrong_format: HashSet::new(),
            delay: Arc::new(|_| Duration::from_millis(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SubmitRead(u64),
    /// Logged right before the process callback runs.
    Processing(u64),
}

#[derive(Debug, Default)]
pub struct MockLog {
    /// (frame index, ticket kind, frames in flight) per accepted read submission.
    pub read_submissions: Vec<(u64, TicketKind, usize)>,
    /// Callback invocations per job id.
    pub callbacks: HashMap<u64, usize>,
    /// Job ids accepted by submit.
    pub submitted_jobs: Vec<u64>,
    pub events: Vec<Event>,
}

impl MockLog {
    pub fn decode_submissions(&self) -> Vec<(u64, usize)> {
        self.read_submissions
            .iter()
            .filter(|(_, kind, _)| *kind == TicketKind::Decode)
            .map(|(index, _, in_flight)| (*index, *in_flight))
            .collect()
    }
}

struct MockShared {
    script: Script,
    callback: RwLock<Option<Arc<dyn Callback<FrameTicket>>>>,
    pending: Mutex<usize>,
    idle: Condvar,
    next_id: AtomicU64,
    log: Mutex<MockLog>,
}

impl MockShared {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn spawn(self: &Arc<Self>, job: JobHandle<FrameTicket>, index: u64, frame: Option<MockFrame>) {
        *self.pending.lock() += 1;
        self.log.lock().submitted_jobs.push(job.id());
        let shared = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep((shared.script.delay)(index));
            let id = job.id();
            let callback = shared.callback.read().clone();
            if let Some(callback) = callback {
                match frame {
                    None => {
                        let result: Result<Box<dyn Frame<FrameTicket>>, EngineError> =
                            if shared.script.fail_read.contains(&index) {
                                Err(EngineError::InvalidClip(format!("corrupt frame {}", index)))
                            } else {
                                Ok(Box::new(MockFrame {
                                    shared: shared.clone(),
                                    index,
                                    format: ResourceFormat::default(),
                                    scale: ResolutionScale::default(),
                                }))
                            };
                        callback.read_complete(job, result);
                    }
                    Some(frame) => {
                        let (width, height) =
                            frame.scale.apply(shared.script.width, shared.script.height);
                        let format = if shared.script.wrong_format.contains(&index) {
                            ResourceFormat::BgraF32
                        } else {
                            frame.format
                        };
                        let image = MockImage {
                            width,
                            height,
                            format,
                            data: vec![index as u8; format.frame_size(width, height)],
                        };
                        shared.log.lock().events.push(Event::Processing(index));
                        if shared.script.fail_process.contains(&index) {
                            let error = EngineError::InvalidClip(format!("undecodable frame {}", index));
                            callback.process_complete(job, Err(error));
                        } else {
                            callback.process_complete(job, Ok(&image));
                        }
                    }
                }
            }
            *shared.log.lock().callbacks.entry(id).or_default() += 1;
            shared.finish_one();
        });
    }
}

pub struct MockCodec {
    shared: Arc<MockShared>,
}

impl MockCodec {
    pub fn new(script: Script) -> Self {
        Self {
            shared: Arc::new(MockShared {
                script,
                callback: RwLock::new(None),
                pending: Mutex::new(0),
                idle: Condvar::new(),
                next_id: AtomicU64::new(0),
                log: Mutex::new(MockLog::default()),
            }),
        }
    }

    pub fn log(&self) -> parking_lot::MutexGuard<'_, MockLog> {
        self.shared.log.lock()
    }

    pub fn pending(&self) -> usize {
        *self.shared.pending.lock()
    }
}

impl Codec<FrameTicket> for MockCodec {
    type Clip = MockClip;

    fn open_clip(&self, path: &Path) -> Result<Self::Clip, EngineError> {
        if self.shared.script.fail_open {
            return Err(EngineError::InvalidClip(path.display().to_string()));
        }
        Ok(MockClip {
            shared: self.shared.clone(),
        })
    }

    fn set_callback(&self, callback: Arc<dyn Callback<FrameTicket>>) {
        *self.shared.callback.write() = Some(callback);
    }

    fn flush_jobs(&self) {
        let mut pending = self.shared.pending.lock();
        while *pending > 0 {
            self.shared.idle.wait(&mut pending);
        }
    }
}

pub struct MockClip {
    shared: Arc<MockShared>,
}

impl Clip<FrameTicket> for MockClip {
    fn frame_count(&self) -> u64 {
        self.shared.script.frame_count
    }

    fn frame_rate(&self) -> f32 {
        self.shared.script.frame_rate
    }

    fn create_read_job(
        &self,
        index: u64,
        user_data: FrameTicket,
    ) -> Result<Box<dyn Job<FrameTicket>>, JobError<FrameTicket>> {
        if self.shared.script.fail_read_create.contains(&index) {
            return Err(JobError::new(
                EngineError::Submit(format!("no read job for frame {}", index)),
                Some(user_data),
            ));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockJob {
            shared: self.shared.clone(),
            index,
            job: JobHandle::new(id, JobKind::Read, user_data),
            frame: None,
        }))
    }
}

struct MockJob {
    shared: Arc<MockShared>,
    index: u64,
    job: JobHandle<FrameTicket>,
    frame: Option<MockFrame>,
}

impl Job<FrameTicket> for MockJob {
    fn submit(self: Box<Self>) -> Result<(), JobError<FrameTicket>> {
        let MockJob {
            shared,
            index,
            mut job,
            frame,
        } = *self;
        let script = &shared.script;

        let failing = match job.kind() {
            JobKind::Read => script.fail_read_submit.contains(&index),
            JobKind::DecodeProcess => script.fail_decode_submit.contains(&index),
        };
        if failing {
            return Err(JobError::new(
                EngineError::Submit(format!("{:?} job for frame {}", job.kind(), index)),
                job.take_user_data(),
            ));
        }

        if job.kind() == JobKind::Read {
            let ticket = job.user_data().expect("read job carries a ticket");
            let mut log = shared.log.lock();
            log.read_submissions
                .push((index, ticket.kind(), ticket.in_flight()));
            log.events.push(Event::SubmitRead(index));
        }
        shared.spawn(job, index, frame);
        Ok(())
    }
}

struct MockFrame {
    shared: Arc<MockShared>,
    index: u64,
    format: ResourceFormat,
    scale: ResolutionScale,
}

impl Frame<FrameTicket> for MockFrame {
    fn index(&self) -> u64 {
        self.index
    }

    fn set_resource_format(&mut self, format: ResourceFormat) -> Result<(), EngineError> {
        if self.shared.script.fail_configure.contains(&self.index) {
            return Err(EngineError::Unsupported(format!("{} for frame {}", format, self.index)));
        }
        self.format = format;
        Ok(())
    }

    fn set_resolution_scale(&mut self, scale: ResolutionScale) -> Result<(), EngineError> {
        self.scale = scale;
        Ok(())
    }

    fn create_decode_and_process_job(
        self: Box<Self>,
        user_data: FrameTicket,
    ) -> Result<Box<dyn Job<FrameTicket>>, JobError<FrameTicket>> {
        if self.shared.script.fail_decode_create.contains(&self.index) {
            return Err(JobError::new(
                EngineError::Submit(format!("no decode job for frame {}", self.index)),
                Some(user_data),
            ));
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockJob {
            shared: self.shared.clone(),
            index: self.index,
            job: JobHandle::new(id, JobKind::DecodeProcess, user_data),
            frame: Some(*self),
        }))
    }
}

struct MockImage {
    width: u32,
    height: u32,
    format: ResourceFormat,
    data: Vec<u8>,
}

impl ProcessedImage for MockImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resource_format(&self) -> ResourceFormat {
        self.format
    }

    fn resource(&self) -> &[u8] {
        &self.data
    }
}
