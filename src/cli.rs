use std::path::PathBuf;

use braw_bus::{
    DecodeOptions, EmitOrder, ResolutionScale, ResourceFormat, SessionConfig,
    driver::DEFAULT_CEILING,
};
use clap::{Parser, builder::TypedValueParser};

/// Decodes raw clip frames to stdout.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Clip to decode.
    pub file: PathBuf,

    /// Output pixel format: rgba, bgra, 16il, 16pl, f32s, f32p or f32a.
    #[arg(short, long = "color-format", default_value = "rgba")]
    pub color_format: ResourceFormat,

    /// Resolution divisor: 1, 2, 4 or 8.
    #[arg(short, long, default_value = "1")]
    pub scale: ResolutionScale,

    /// Maximum number of frames in flight.
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_CEILING,
        value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize)
    )]
    pub threads: usize,

    /// First frame to decode.
    #[arg(short = 'i', long = "in", default_value_t = 0)]
    pub start: u64,

    /// One past the last frame to decode, 0 for the whole clip.
    #[arg(short = 'o', long = "out", default_value_t = 0)]
    pub end: u64,

    /// Print clip information and exit.
    #[arg(short = 'n', long)]
    pub info: bool,

    /// Print the ffmpeg input arguments for the decoded stream and exit.
    #[arg(short, long)]
    pub ffformat: bool,

    /// Report per-frame progress on stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write frames in frame order instead of completion order.
    #[arg(long)]
    pub ordered: bool,

    /// Worker threads of the software engine.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    pub workers: Option<usize>,
}

impl Cli {
    /// Parses the process arguments. Usage errors exit with code 1, help and
    /// version output with 0.
    pub fn parse_or_exit() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(e) if e.use_stderr() => {
                let _ = e.print();
                std::process::exit(1);
            }
            Err(e) => e.exit(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.file)
            .with_format(self.color_format)
            .with_scale(self.scale)
            .with_verbose(self.verbose)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            start: self.start,
            end: self.end,
            ceiling: self.threads,
            order: if self.ordered {
                EmitOrder::FrameIndex
            } else {
                EmitOrder::AsCompleted
            },
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(DEFAULT_CEILING)
        })
    }
}
