//! Completion handlers driving a frame from read to decode+process to output.

use bytes::Bytes;

use crate::{
    context::{FrameTicket, TicketKind},
    engine::{Callback, EngineError, Frame, JobHandle, ProcessedImage},
};

/// Callback registered with the codec. Holds no state of its own; everything
/// a frame needs travels in its [`FrameTicket`].
#[derive(Debug, Default)]
pub struct FrameProcessor;

impl FrameProcessor {
    pub fn new() -> Self {
        Self
    }

    fn configure(frame: &mut dyn Frame<FrameTicket>, ticket: &FrameTicket) -> Result<(), EngineError> {
        let config = ticket.config();
        frame.set_resource_format(config.format)?;
        frame.set_resolution_scale(config.scale)?;
        Ok(())
    }

    fn submit_decode(frame: Box<dyn Frame<FrameTicket>>, ticket: FrameTicket) {
        let index = ticket.index();
        let job = match frame.create_decode_and_process_job(ticket) {
            Ok(job) => job,
            Err(e) => {
                log::warn!("create decode job for frame {} failed: {}", index, e.error);
                return;
            }
        };
        if let Err(e) = job.submit() {
            log::warn!("submit decode job for frame {} failed: {}", index, e.error);
        }
    }
}

impl Callback<FrameTicket> for FrameProcessor {
    fn read_complete(
        &self,
        mut job: JobHandle<FrameTicket>,
        result: Result<Box<dyn Frame<FrameTicket>>, EngineError>,
    ) {
        let Some(ticket) = job.take_user_data() else {
            log::warn!("read job {} completed without a frame ticket", job.id());
            return;
        };

        let mut frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("read frame {} failed: {}", ticket.index(), e);
                return;
            }
        };

        if frame.index() != ticket.index() {
            log::warn!(
                "read job for frame {} delivered frame {}",
                ticket.index(),
                frame.index()
            );
            return;
        }

        if let Err(e) = Self::configure(frame.as_mut(), &ticket) {
            log::warn!("configure frame {} failed: {}", ticket.index(), e);
            return;
        }

        Self::submit_decode(frame, ticket);
    }

    fn process_complete(
        &self,
        mut job: JobHandle<FrameTicket>,
        result: Result<&dyn ProcessedImage, EngineError>,
    ) {
        let Some(ticket) = job.take_user_data() else {
            log::warn!("process job {} completed without a frame ticket", job.id());
            return;
        };

        let image = match result {
            Ok(image) => image,
            Err(e) => {
                log::warn!("decode frame {} failed: {}", ticket.index(), e);
                return;
            }
        };

        if ticket.config().verbose {
            eprint!(
                "\rBRAW Frame/threads [{}][{}] ",
                ticket.index(),
                ticket.in_flight()
            );
        }

        match ticket.kind() {
            TicketKind::Probe => ticket.probed(image.width(), image.height()),
            TicketKind::Decode => {
                let format = ticket.config().format;
                if image.resource_format() != format {
                    log::warn!(
                        "frame {} decoded as {}, requested {}",
                        ticket.index(),
                        image.resource_format(),
                        format
                    );
                    return;
                }
                let size = image.resource_size_bytes();
                let resource = image.resource();
                if size > resource.len() {
                    log::warn!(
                        "frame {} reports {} bytes but holds {}",
                        ticket.index(),
                        size,
                        resource.len()
                    );
                    return;
                }
                let data = Bytes::copy_from_slice(&resource[..size]);
                ticket.emit(image.width(), image.height(), data);
            }
        }
    }
}
