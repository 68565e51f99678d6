use std::sync::Arc;

use braw_bus::{Session, context::FrameTicket, soft::SoftCodec};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;

mod cli;
mod mode;

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    // stdout carries pixel data; RUST_LOG overrides the level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let codec = Arc::new(SoftCodec::<FrameTicket>::new(cli.workers())?);
    let session = Session::open(codec, cli.session_config()).await?;
    let mut stdout = tokio::io::stdout();

    let result = if cli.info {
        mode::print_info(&session, &mut stdout).await
    } else if cli.ffformat {
        mode::print_ffmpeg_format(&session, &mut stdout).await
    } else {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("interrupted, finishing frames in flight");
                cancel_clone.cancel();
            }
        });

        mode::decode(&session, &cli.decode_options(), &mut stdout, &cancel)
            .await
            .map(|_| ())
    };

    mode::close_after(session, result).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_or_exit();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
