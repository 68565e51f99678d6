//! Contract of the asynchronous decoding engine.
//!
//! The engine owns its worker threads. Every job carries one piece of user
//! data, is submitted without blocking, and completes through the registered
//! [`Callback`] exactly once, on whichever engine thread finished the work.
//! Dropping a job or a [`JobHandle`] releases it.

use std::path::Path;
use std::sync::Arc;

use crate::format::{ResolutionScale, ResourceFormat};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid clip: {0}")]
    InvalidClip(String),
    #[error("frame {index} out of range, clip has {count} frames")]
    FrameOutOfRange { index: u64, count: u64 },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("job submission failed: {0}")]
    Submit(String),
    #[error("codec is closed")]
    Closed,
}

/// A job that could not be created or submitted. The user data is handed
/// back so the caller decides what happens to it.
#[derive(Debug)]
pub struct JobError<U> {
    pub error: EngineError,
    pub user_data: Option<U>,
}

impl<U> JobError<U> {
    pub fn new(error: EngineError, user_data: Option<U>) -> Self {
        Self { error, user_data }
    }

    pub fn into_user_data(self) -> Option<U> {
        self.user_data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Read,
    DecodeProcess,
}

/// A completed job as seen by a [`Callback`].
#[derive(Debug)]
pub struct JobHandle<U> {
    id: u64,
    kind: JobKind,
    user_data: Option<U>,
}

impl<U> JobHandle<U> {
    pub fn new(id: u64, kind: JobKind, user_data: U) -> Self {
        Self {
            id,
            kind,
            user_data: Some(user_data),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn user_data(&self) -> Option<&U> {
        self.user_data.as_ref()
    }

    /// Moves the user data out. Returns `None` on every call after the first.
    pub fn take_user_data(&mut self) -> Option<U> {
        self.user_data.take()
    }
}

pub trait Job<U>: Send {
    fn submit(self: Box<Self>) -> Result<(), JobError<U>>;
}

/// An encoded frame delivered by a read job.
pub trait Frame<U>: Send {
    fn index(&self) -> u64;

    fn set_resource_format(&mut self, format: ResourceFormat) -> Result<(), EngineError>;

    fn set_resolution_scale(&mut self, scale: ResolutionScale) -> Result<(), EngineError>;

    fn create_decode_and_process_job(
        self: Box<Self>,
        user_data: U,
    ) -> Result<Box<dyn Job<U>>, JobError<U>>;
}

/// Decoded pixels, borrowed for the duration of the process callback.
pub trait ProcessedImage {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn resource_format(&self) -> ResourceFormat;

    fn resource(&self) -> &[u8];

    fn resource_size_bytes(&self) -> usize {
        self.resource().len()
    }
}

pub trait Callback<U>: Send + Sync {
    fn read_complete(
        &self,
        job: JobHandle<U>,
        result: Result<Box<dyn Frame<U>>, EngineError>,
    );

    fn process_complete(
        &self,
        job: JobHandle<U>,
        result: Result<&dyn ProcessedImage, EngineError>,
    );
}

pub trait Clip<U>: Send + Sync {
    fn frame_count(&self) -> u64;

    fn frame_rate(&self) -> f32;

    fn create_read_job(&self, index: u64, user_data: U) -> Result<Box<dyn Job<U>>, JobError<U>>;
}

pub trait Codec<U>: Send + Sync {
    type Clip: Clip<U>;

    fn open_clip(&self, path: &Path) -> Result<Self::Clip, EngineError>;

    fn set_callback(&self, callback: Arc<dyn Callback<U>>);

    /// Blocks until every submitted job, including jobs submitted from
    /// inside callbacks, has completed and its callback has returned.
    fn flush_jobs(&self);
}
