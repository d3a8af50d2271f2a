//! Replay a JSON-lines keypoint trace through the tracker and log each transform.
//!
//! Usage: replay <trace.jsonl> [config.toml] [garment-id]

use anyhow::{bail, Context, Result};
use log::info;
use std::env;
use std::fs::File;
use std::io::BufReader;

use garment_overlay::config::Config;
use garment_overlay::mapping::Dimensions;
use garment_overlay::overlay::LogSink;
use garment_overlay::pipeline::OverlayContext;
use garment_overlay::replay::replay;
use garment_overlay::BUILD_VERSION;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let Some(trace_path) = args.get(1) else {
        bail!("usage: replay <trace.jsonl> [config.toml] [garment-id]");
    };
    let config = match args.get(2) {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default("config.toml"),
    };
    info!("replay ({})", BUILD_VERSION);

    let mut context = OverlayContext::new(&config)?;
    let garment = match args.get(3) {
        Some(id) => id.clone(),
        None => config
            .garments
            .first()
            .map(|g| g.id.clone())
            .context("garment catalog is empty")?,
    };
    if !context.select_garment(&garment) {
        bail!("unknown garment {:?}", garment);
    }

    let file = File::open(trace_path).with_context(|| format!("failed to open {}", trace_path))?;
    let mut sink = LogSink::new(Dimensions::new(
        config.sink.viewport_width,
        config.sink.viewport_height,
    ));
    let summary = replay(BufReader::new(file), &mut context, &mut sink)?;

    let final_transform = context.transform();
    info!(
        "{} frames, {} detected, {} skipped lines, {} transforms sent",
        summary.frames, summary.detected, summary.skipped_lines, summary.sink_updates
    );
    info!(
        "final: pos=({:.2}, {:.2}, {:.3}) scale={:.3}",
        final_transform.position.x,
        final_transform.position.y,
        final_transform.position.z,
        final_transform.scale
    );
    Ok(())
}
