//! Bake a chain expression to PNG files through the background builder.

use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tessel_config::EngineConfig;
use tessel_core::{BuildJob, Builder};
use tessel_registry::NodeRegistry;

use super::common::{parse_frames, parse_size};
use crate::chain::{build_chain, parse_chain};
use crate::png::PngSink;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Args)]
pub struct BakeArgs {
    /// Chain expression, e.g. "noise:scale=8 | levels | output"
    #[arg(value_name = "CHAIN")]
    chain: String,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Frames to bake, end exclusive (e.g. 0..24)
    #[arg(long, value_parser = parse_frames, default_value = "0..1")]
    frames: Range<i32>,

    /// Working resolution as WxH (default from config)
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Also write every intermediate stage
    #[arg(long)]
    all: bool,
}

pub fn run(args: BakeArgs, config: &EngineConfig) -> anyhow::Result<()> {
    let registry = NodeRegistry::new();
    let spec = parse_chain(&args.chain)?;
    let mut built = build_chain(&spec, &registry)?;

    let ids: Vec<_> = built.graph.iter().map(|s| s.id()).collect();
    for &id in &ids {
        built
            .graph
            .set_time_window(id, args.frames.start, args.frames.end)?;
    }
    let outputs = if args.all { ids } else { vec![built.output] };
    let names: HashMap<_, _> = outputs
        .iter()
        .filter_map(|&id| built.graph.info(id).map(|i| (id, i.name.clone())))
        .collect();

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut builder_config = config.to_builder_config();
    if let Some((w, h)) = args.size {
        builder_config.width = w;
        builder_config.height = h;
    }

    let frame_count = args.frames.len();
    println!(
        "Baking {} stage(s) over {} frame(s) at {}x{}",
        outputs.len(),
        frame_count,
        builder_config.width,
        builder_config.height
    );

    let builder = Builder::new(registry.backend_factory(), builder_config);
    builder.submit(BuildJob::new(
        args.chain.clone(),
        built.graph,
        outputs,
        Box::new(PngSink::new(&args.output, names)),
    ));

    let pb = ProgressBar::new(frame_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")
            .context("progress bar template")?
            .progress_chars("##-"),
    );
    while builder.is_busy() != Some(false) {
        if let Some(jobs) = builder.poll_progress()
            && let Some(job) = jobs.first()
        {
            pb.set_position((job.progress * frame_count as f32).round() as u64);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    builder.wait_idle();

    let mut failed = false;
    for job in builder.take_finished() {
        match job.result {
            Ok(report) => {
                pb.set_position(report.frames.len() as u64);
                pb.finish_with_message("done");
                println!(
                    "Wrote {} file(s) to {} ({} evaluation pass(es))",
                    report.written,
                    args.output.display(),
                    report.evaluations
                );
            }
            Err(e) => {
                pb.abandon();
                eprintln!("Bake '{}' failed: {e}", job.name);
                failed = true;
            }
        }
    }
    if failed {
        anyhow::bail!("bake failed");
    }
    Ok(())
}
