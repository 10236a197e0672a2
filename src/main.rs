// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "fimc")]
#[command(about = "S3C64xx FIMC transform and capture on a simulated block")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: ~/.config/fimc/config.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported pixel formats
    Formats,

    /// Show the scaler parameters for a source/destination pair
    Scale {
        /// Source size, WxH
        #[arg(long)]
        src: String,

        /// Destination size, WxH
        #[arg(long)]
        dst: String,

        /// Rotation in degrees (0, 90, 180, 270)
        #[arg(short, long, default_value = "0")]
        rotate: i32,
    },

    /// Run transform jobs on the simulated block
    Convert {
        /// Source fourcc, e.g. YUYV
        #[arg(long, default_value = "YUYV")]
        src_fmt: String,

        /// Source size, WxH
        #[arg(long)]
        src: String,

        /// Destination fourcc, e.g. RGB4
        #[arg(long, default_value = "RGB4")]
        dst_fmt: String,

        /// Destination size, WxH
        #[arg(long)]
        dst: String,

        /// Number of frames to convert
        #[arg(short, long, default_value = "4")]
        frames: usize,
    },

    /// Stream frames from the simulated sensor
    Capture {
        /// Number of frames to capture
        #[arg(short, long, default_value = "8")]
        frames: usize,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=fimc=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = fimc::Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Formats => cli::list_formats(),
        Commands::Scale { src, dst, rotate } => cli::show_scaler(&src, &dst, rotate),
        Commands::Convert {
            src_fmt,
            src,
            dst_fmt,
            dst,
            frames,
        } => cli::convert(config, &src_fmt, &src, &dst_fmt, &dst, frames),
        Commands::Capture { frames } => cli::capture(config, frames),
        Commands::Config => cli::print_config(&config),
    }
}
