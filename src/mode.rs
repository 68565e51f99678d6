use braw_bus::{
    DecodeOptions, DecodeReport, Session, context::FrameTicket, engine::Codec,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Writes the clip information block.
pub async fn print_info<C, W>(session: &Session<C>, out: &mut W) -> anyhow::Result<()>
where
    C: Codec<FrameTicket> + 'static,
    W: AsyncWrite + Unpin,
{
    out.write_all(session.info().to_string().as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Writes the ffmpeg input arguments for the decoded stream. Nothing is
/// written when the output format has no ffmpeg equivalent.
pub async fn print_ffmpeg_format<C, W>(session: &Session<C>, out: &mut W) -> anyhow::Result<()>
where
    C: Codec<FrameTicket> + 'static,
    W: AsyncWrite + Unpin,
{
    let args = session
        .info()
        .ffmpeg_input_format(session.config().format)?;
    out.write_all(args.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

pub async fn decode<C, W>(
    session: &Session<C>,
    options: &DecodeOptions,
    out: &mut W,
    cancel: &CancellationToken,
) -> anyhow::Result<DecodeReport>
where
    C: Codec<FrameTicket> + 'static,
    W: AsyncWrite + Unpin,
{
    let verbose = session.config().verbose;
    let range = options.frame_range(session.info().frame_count);
    if verbose {
        eprintln!("Beginning decode of {}-{}", range.start, range.end);
    }

    let report = session.decode(options, out, cancel).await?;
    if verbose {
        eprintln!();
    }
    if report.dropped > 0 {
        log::warn!("{} frames could not be decoded", report.dropped);
    }
    Ok(report)
}

/// Closes the session and returns the mode's own result. A close failure is
/// only logged so it never hides the error that ended the mode.
pub async fn close_after<C>(session: Session<C>, result: anyhow::Result<()>) -> anyhow::Result<()>
where
    C: Codec<FrameTicket> + 'static,
{
    if let Err(e) = session.close().await {
        log::error!("close session error: {:#}", e);
    }
    result
}

#[cfg(test)]
#[path = "mode_test.rs"]
mod mode_test;
