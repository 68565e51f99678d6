use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{
    Callback, Clip, Codec, EngineError, Frame, JobHandle, JobKind, ProcessedImage,
};
use crate::format::{ResolutionScale, ResourceFormat};
use crate::soft::{ClipWriter, SoftCodec};

/// Writes a clip whose frame `n` has every sample set to `n * 0x0100`.
fn write_clip(dir: &Path, width: u32, height: u32, frames: u16) -> anyhow::Result<PathBuf> {
    let path = dir.join("clip.rclp");
    let mut writer = ClipWriter::create(&path, width, height, 25.0)?;
    for n in 0..frames {
        writer.write_frame(&vec![n * 0x0100; (width * height * 3) as usize])?;
    }
    writer.finish()?;
    Ok(path)
}

#[derive(Default)]
struct Recorder {
    format: Option<ResourceFormat>,
    reads: Mutex<Vec<(JobKind, u64)>>,
    images: Mutex<Vec<(u64, u32, u32, Vec<u8>)>>,
    failures: Mutex<Vec<u64>>,
}

impl Callback<u64> for Recorder {
    fn read_complete(&self, mut job: JobHandle<u64>, result: Result<Box<dyn Frame<u64>>, EngineError>) {
        let tag = job.take_user_data().unwrap();
        self.reads.lock().push((job.kind(), tag));
        let mut frame = match result {
            Ok(frame) => frame,
            Err(_) => {
                self.failures.lock().push(tag);
                return;
            }
        };
        frame
            .set_resource_format(self.format.unwrap_or_default())
            .unwrap();
        frame.set_resolution_scale(ResolutionScale::Half).unwrap();
        let job = frame.create_decode_and_process_job(tag).ok().unwrap();
        job.submit().ok().unwrap();
    }

    fn process_complete(&self, mut job: JobHandle<u64>, result: Result<&dyn ProcessedImage, EngineError>) {
        assert_eq!(job.kind(), JobKind::DecodeProcess);
        let tag = job.take_user_data().unwrap();
        let image = result.unwrap();
        self.images
            .lock()
            .push((tag, image.width(), image.height(), image.resource().to_vec()));
    }
}

#[test]
fn test_chain_completes_before_flush_returns() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_clip(dir.path(), 8, 4, 6)?;

    let codec = SoftCodec::<u64>::new(3)?;
    let recorder = Arc::new(Recorder::default());
    codec.set_callback(recorder.clone());
    let clip = codec.open_clip(&path)?;
    assert_eq!(clip.frame_count(), 6);
    assert_eq!(clip.frame_rate(), 25.0);

    for index in 0..6 {
        clip.create_read_job(index, index).ok().unwrap().submit().ok().unwrap();
    }
    codec.flush_jobs();

    let mut images = recorder.images.lock().clone();
    images.sort_by_key(|(tag, ..)| *tag);
    assert_eq!(images.len(), 6);
    for (tag, width, height, data) in images {
        assert_eq!((width, height), (4, 2));
        assert_eq!(data.len(), 4 * 2 * 4);
        // high byte of n * 0x0100 is n
        assert_eq!(&data[..4], &[tag as u8, tag as u8, tag as u8, 0xff]);
    }
    assert!(recorder.failures.lock().is_empty());
    let reads = recorder.reads.lock();
    assert_eq!(reads.len(), 6);
    assert!(reads.iter().all(|(kind, _)| *kind == JobKind::Read));
    Ok(())
}

#[test]
fn test_out_of_range_read_hands_back_user_data() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_clip(dir.path(), 2, 2, 1)?;

    let codec = SoftCodec::<u64>::new(1)?;
    let clip = codec.open_clip(&path)?;
    let err = match clip.create_read_job(5, 42) {
        Ok(_) => panic!("frame 5 does not exist"),
        Err(err) => err,
    };
    assert!(matches!(
        err.error,
        EngineError::FrameOutOfRange { index: 5, count: 1 }
    ));
    assert_eq!(err.into_user_data(), Some(42));
    Ok(())
}

#[test]
fn test_submit_after_codec_drop_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_clip(dir.path(), 2, 2, 1)?;

    let codec = SoftCodec::<u64>::new(2)?;
    let clip = codec.open_clip(&path)?;
    drop(codec);

    let job = clip.create_read_job(0, 9).ok().unwrap();
    let err = job.submit().unwrap_err();
    assert!(matches!(err.error, EngineError::Closed));
    assert_eq!(err.into_user_data(), Some(9));
    Ok(())
}

#[test]
fn test_open_missing_clip() {
    let codec = SoftCodec::<u64>::new(1).unwrap();
    assert!(matches!(
        codec.open_clip(Path::new("/nonexistent/clip.rclp")),
        Err(EngineError::Io(_))
    ));
}

#[test]
fn test_scale_too_small_is_unsupported() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_clip(dir.path(), 4, 4, 1)?;

    struct ScaleProbe(Mutex<Option<bool>>);
    impl Callback<u64> for ScaleProbe {
        fn read_complete(&self, _job: JobHandle<u64>, result: Result<Box<dyn Frame<u64>>, EngineError>) {
            let mut frame = result.unwrap();
            let rejected = frame.set_resolution_scale(ResolutionScale::Eighth).is_err();
            *self.0.lock() = Some(rejected);
        }

        fn process_complete(&self, _job: JobHandle<u64>, _result: Result<&dyn ProcessedImage, EngineError>) {}
    }

    let codec = SoftCodec::<u64>::new(1)?;
    let probe = Arc::new(ScaleProbe(Mutex::new(None)));
    codec.set_callback(probe.clone());
    let clip = codec.open_clip(&path)?;
    clip.create_read_job(0, 0).ok().unwrap().submit().ok().unwrap();
    codec.flush_jobs();

    assert_eq!(*probe.0.lock(), Some(true));
    Ok(())
}

#[test]
fn test_workers_take_jobs_in_parallel() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_clip(dir.path(), 2, 2, 3)?;

    // every read callback waits for the other two
    struct Rendezvous(std::sync::Barrier, Mutex<Vec<u64>>);
    impl Callback<u64> for Rendezvous {
        fn read_complete(&self, mut job: JobHandle<u64>, _result: Result<Box<dyn Frame<u64>>, EngineError>) {
            self.0.wait();
            self.1.lock().push(job.take_user_data().unwrap());
        }

        fn process_complete(&self, _job: JobHandle<u64>, _result: Result<&dyn ProcessedImage, EngineError>) {}
    }

    let codec = SoftCodec::<u64>::new(3)?;
    let rendezvous = Arc::new(Rendezvous(std::sync::Barrier::new(3), Mutex::new(Vec::new())));
    codec.set_callback(rendezvous.clone());
    let clip = codec.open_clip(&path)?;
    for index in 0..3 {
        clip.create_read_job(index, index).ok().unwrap().submit().ok().unwrap();
    }
    codec.flush_jobs();

    let mut done = rendezvous.1.lock().clone();
    done.sort();
    assert_eq!(done, vec![0, 1, 2]);
    Ok(())
}
