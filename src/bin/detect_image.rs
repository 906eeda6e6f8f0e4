//! detect_image - one-shot detection on a still image
//!
//! Runs the configured pipeline on a single JPEG/PNG file, writes the
//! annotated copy next to it (or to --out) and prints the summary.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use smartsign::ingest::image_dir::load_frame;
use smartsign::ui::{Ui, UiMode};
use smartsign::{ClassCounts, FrameStatus, PipelineState, SmartsignConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to analyse.
    image: PathBuf,
    /// Where to write the annotated image (defaults to <image>_annotated.png).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Config file (JSON or TOML); defaults to SMARTSIGN_CONFIG and env overrides.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print detections as JSON instead of the text summary.
    #[arg(long)]
    json: bool,
    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn default_output(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    image.with_file_name(format!("{stem}_annotated.png"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);

    let cfg = ui
        .run_stage("loading config", || match &args.config {
            Some(path) => SmartsignConfig::from_path(path),
            None => SmartsignConfig::load(),
        })
        .context("invalid configuration")?;

    let mut pipeline = ui
        .run_stage("loading detector", || cfg.build_pipeline())
        .context("failed to build detection pipeline")?;
    if pipeline.state() == PipelineState::Disabled {
        return Err(anyhow!(
            "detector unavailable: {}",
            pipeline.last_error().unwrap_or("unknown error")
        ));
    }

    let frame = ui.run_stage("reading image", || load_frame(&args.image))?;

    let outcome = {
        let _stage = ui.stage("detecting");
        pipeline.run(&frame)
    };
    if let FrameStatus::Failed(reason) = &outcome.status {
        return Err(anyhow!("detection failed on {}: {}", args.image.display(), reason));
    }

    let out = args.out.clone().unwrap_or_else(|| default_output(&args.image));
    outcome
        .annotated
        .to_rgb_image()?
        .save(&out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    log::info!(
        "annotated image written to {} ({} detections in {:?})",
        out.display(),
        outcome.results.len(),
        outcome.elapsed
    );

    let counts = ClassCounts::from_results(&outcome.results);
    let sign = cfg.sign_advisor().advise(&counts);
    if args.json {
        let report = serde_json::json!({
            "image": args.image.display().to_string(),
            "annotated": out.display().to_string(),
            "counts": counts,
            "sign": sign,
            "detections": outcome.results,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", outcome.summary);
        println!("Sign: {}", sign.message());
    }
    Ok(())
}
