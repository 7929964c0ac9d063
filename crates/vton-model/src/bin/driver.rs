//! Try-on inference driver CLI.
//!
//! One invocation runs a single stage (GMM or TOM) over every pair in
//! the data list and exits; the HTTP layer invokes this binary per
//! session.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use vton_core::Stage;
use vton_model::checkpoint::DeviceKind;
use vton_model::driver::{run, DriverOptions};

#[derive(Parser)]
#[command(name = "vton-driver", about = "Two-stage try-on inference driver")]
struct Cli {
    /// Run name (board subdirectory).
    #[arg(long, default_value = "run")]
    name: String,

    /// Stage to run: GMM or TOM.
    #[arg(long)]
    stage: String,

    #[arg(long, default_value = "data")]
    dataroot: PathBuf,

    #[arg(long, default_value = "test")]
    datamode: String,

    /// Pair manifest listing person/cloth filenames.
    #[arg(long)]
    data_list: PathBuf,

    /// Stage checkpoint (safetensors).
    #[arg(long)]
    checkpoint: PathBuf,

    /// Landmark checkpoint for on-the-fly pose derivation.
    #[arg(long)]
    pose_checkpoint: Option<PathBuf>,

    #[arg(long, default_value = "result")]
    result_dir: PathBuf,

    #[arg(long, default_value = "board")]
    board_dir: PathBuf,

    #[arg(short = 'b', long, default_value_t = 4)]
    batch_size: usize,

    /// Dataset prefetch worker threads.
    #[arg(short = 'j', long, default_value_t = 1)]
    workers: usize,

    /// Montage logging period, in steps.
    #[arg(long, default_value_t = 1)]
    display_count: usize,

    /// Compute device: auto, cpu, cuda[:N] or metal.
    #[arg(long, default_value = "auto")]
    device: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let stage: Stage = cli.stage.parse().context("bad --stage")?;
    let device: DeviceKind = cli.device.parse().context("bad --device")?;

    let summary = run(DriverOptions {
        name: cli.name,
        stage,
        dataroot: cli.dataroot,
        datamode: cli.datamode,
        data_list: cli.data_list,
        checkpoint: cli.checkpoint,
        pose_checkpoint: cli.pose_checkpoint,
        result_dir: cli.result_dir,
        board_dir: cli.board_dir,
        batch_size: cli.batch_size,
        workers: cli.workers,
        display_count: cli.display_count,
        device,
    })?;

    println!(
        "wrote {} images to {}",
        summary.samples,
        summary.output_dir.display()
    );
    Ok(())
}
