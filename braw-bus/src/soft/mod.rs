//! Software decoding engine for `RCLP` clips.
//!
//! Jobs are queued to a fixed set of worker threads owned by the codec.
//! Callbacks run on those workers, and jobs submitted from inside a callback
//! go back on the same queue.

mod container;
mod convert;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, SendError, Sender};
use parking_lot::{Condvar, Mutex, RwLock};

pub use container::{ClipHeader, ClipSource, ClipWriter};
pub use convert::process_frame;

use crate::{
    engine::{
        Callback, Clip, Codec, EngineError, Frame, Job, JobError, JobHandle, JobKind,
        ProcessedImage,
    },
    format::{ResolutionScale, ResourceFormat},
};

enum Task<U> {
    Read {
        job: JobHandle<U>,
        source: Arc<ClipSource>,
        index: u64,
    },
    Process {
        job: JobHandle<U>,
        frame: EncodedFrame,
    },
}

impl<U> Task<U> {
    fn into_user_data(self) -> Option<U> {
        match self {
            Task::Read { mut job, .. } => job.take_user_data(),
            Task::Process { mut job, .. } => job.take_user_data(),
        }
    }
}

struct EncodedFrame {
    index: u64,
    samples: Vec<u16>,
    width: u32,
    height: u32,
    format: ResourceFormat,
    scale: ResolutionScale,
}

struct Shared<U> {
    tasks: Mutex<Option<Sender<Task<U>>>>,
    callback: RwLock<Option<Arc<dyn Callback<U>>>>,
    pending: Mutex<usize>,
    idle: Condvar,
    next_job_id: AtomicU64,
}

impl<U> Shared<U> {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    fn flush(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.idle.wait(&mut pending);
        }
    }
}

impl<U: Send + 'static> Shared<U> {
    fn job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    fn submit(&self, task: Task<U>) -> Result<(), JobError<U>> {
        let Some(sender) = self.tasks.lock().clone() else {
            return Err(JobError::new(EngineError::Closed, task.into_user_data()));
        };

        *self.pending.lock() += 1;
        if let Err(SendError(task)) = sender.send(task) {
            self.finish_one();
            return Err(JobError::new(EngineError::Closed, task.into_user_data()));
        }
        Ok(())
    }

    fn run(self: &Arc<Self>, task: Task<U>) {
        let Some(callback) = self.callback.read().clone() else {
            log::warn!("job finished with no callback registered");
            return;
        };

        match task {
            Task::Read { job, source, index } => {
                let result = source.read_frame(index).map(|samples| {
                    let header = source.header();
                    Box::new(SoftFrame {
                        shared: self.clone(),
                        frame: EncodedFrame {
                            index,
                            samples,
                            width: header.width,
                            height: header.height,
                            format: ResourceFormat::default(),
                            scale: ResolutionScale::default(),
                        },
                    }) as Box<dyn Frame<U>>
                });
                callback.read_complete(job, result);
            }
            Task::Process { job, frame } => {
                let (width, height, data) = process_frame(
                    &frame.samples,
                    frame.width,
                    frame.height,
                    frame.scale,
                    frame.format,
                );
                let image = SoftImage {
                    width,
                    height,
                    format: frame.format,
                    data,
                };
                callback.process_complete(job, Ok(&image));
            }
        }
    }
}

fn worker_loop<U: Send + 'static>(shared: Arc<Shared<U>>, tasks: Receiver<Task<U>>) {
    // ends once the codec drops the last sender
    for task in tasks.iter() {
        if catch_unwind(AssertUnwindSafe(|| shared.run(task))).is_err() {
            log::error!("soft codec callback panicked");
        }
        shared.finish_one();
    }
    log::debug!("soft codec worker exit");
}

pub struct SoftCodec<U> {
    shared: Arc<Shared<U>>,
    workers: Vec<JoinHandle<()>>,
}

impl<U: Send + 'static> SoftCodec<U> {
    pub fn new(workers: usize) -> anyhow::Result<Self> {
        let (tx, rx) = crossbeam::channel::unbounded();
        let shared = Arc::new(Shared {
            tasks: Mutex::new(Some(tx)),
            callback: RwLock::new(None),
            pending: Mutex::new(0),
            idle: Condvar::new(),
            next_job_id: AtomicU64::new(0),
        });

        let mut handles = Vec::with_capacity(workers.max(1));
        for i in 0..workers.max(1) {
            let shared = shared.clone();
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("soft-codec-{}", i))
                .spawn(move || worker_loop(shared, rx))?;
            handles.push(handle);
        }
        log::debug!("soft codec started with {} workers", handles.len());

        Ok(Self {
            shared,
            workers: handles,
        })
    }
}

impl<U: Send + 'static> Codec<U> for SoftCodec<U> {
    type Clip = SoftClip<U>;

    fn open_clip(&self, path: &Path) -> Result<Self::Clip, EngineError> {
        let source = ClipSource::open(path)?;
        log::info!(
            "open clip {}: {}x{} @ {} fps, {} frames",
            path.display(),
            source.header().width,
            source.header().height,
            source.header().frame_rate,
            source.header().frame_count
        );
        Ok(SoftClip {
            shared: self.shared.clone(),
            source: Arc::new(source),
        })
    }

    fn set_callback(&self, callback: Arc<dyn Callback<U>>) {
        *self.shared.callback.write() = Some(callback);
    }

    fn flush_jobs(&self) {
        self.shared.flush();
    }
}

impl<U> Drop for SoftCodec<U> {
    fn drop(&mut self) {
        self.shared.flush();
        // closing the queue lets the workers run out
        self.shared.tasks.lock().take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

pub struct SoftClip<U> {
    shared: Arc<Shared<U>>,
    source: Arc<ClipSource>,
}

impl<U: Send + 'static> Clip<U> for SoftClip<U> {
    fn frame_count(&self) -> u64 {
        self.source.header().frame_count as u64
    }

    fn frame_rate(&self) -> f32 {
        self.source.header().frame_rate
    }

    fn create_read_job(&self, index: u64, user_data: U) -> Result<Box<dyn Job<U>>, JobError<U>> {
        let count = self.frame_count();
        if index >= count {
            return Err(JobError::new(
                EngineError::FrameOutOfRange { index, count },
                Some(user_data),
            ));
        }
        let job = JobHandle::new(self.shared.job_id(), JobKind::Read, user_data);
        Ok(Box::new(SoftJob {
            shared: self.shared.clone(),
            task: Task::Read {
                job,
                source: self.source.clone(),
                index,
            },
        }))
    }
}

struct SoftJob<U> {
    shared: Arc<Shared<U>>,
    task: Task<U>,
}

impl<U: Send + 'static> Job<U> for SoftJob<U> {
    fn submit(self: Box<Self>) -> Result<(), JobError<U>> {
        let SoftJob { shared, task } = *self;
        shared.submit(task)
    }
}

struct SoftFrame<U> {
    shared: Arc<Shared<U>>,
    frame: EncodedFrame,
}

impl<U: Send + 'static> Frame<U> for SoftFrame<U> {
    fn index(&self) -> u64 {
        self.frame.index
    }

    fn set_resource_format(&mut self, format: ResourceFormat) -> Result<(), EngineError> {
        self.frame.format = format;
        Ok(())
    }

    fn set_resolution_scale(&mut self, scale: ResolutionScale) -> Result<(), EngineError> {
        let (width, height) = scale.apply(self.frame.width, self.frame.height);
        if width == 0 || height == 0 {
            return Err(EngineError::Unsupported(format!(
                "scale 1/{} of {}x{}",
                scale.factor(),
                self.frame.width,
                self.frame.height
            )));
        }
        self.frame.scale = scale;
        Ok(())
    }

    fn create_decode_and_process_job(
        self: Box<Self>,
        user_data: U,
    ) -> Result<Box<dyn Job<U>>, JobError<U>> {
        let SoftFrame { shared, frame } = *self;
        let job = JobHandle::new(shared.job_id(), JobKind::DecodeProcess, user_data);
        Ok(Box::new(SoftJob {
            shared,
            task: Task::Process { job, frame },
        }))
    }
}

struct SoftImage {
    width: u32,
    height: u32,
    format: ResourceFormat,
    data: Vec<u8>,
}

impl ProcessedImage for SoftImage {
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

#[cfg(test)]
#[path = "soft_test.rs"]
mod soft_test;
