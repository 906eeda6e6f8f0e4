//! smartsignd - live detection daemon
//!
//! This daemon:
//! 1. Loads configuration (file from SMARTSIGN_CONFIG plus env overrides)
//! 2. Builds the detection pipeline (class names, font, model backend)
//! 3. Opens the frame source and runs the capture loop at the configured fps
//! 4. Logs per-frame summaries and the sign advisory until Ctrl-C or source end

use anyhow::{Context, Result};
use clap::Parser;

use smartsign::capture::{CaptureLoop, DisplaySink, LogSink};
use smartsign::ui::{FrameCounter, Ui, UiMode};
use smartsign::{open_source, ClassCounts, FrameOutcome, PipelineState, SignState, SmartsignConfig};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Print per-class counts as one JSON object per frame on stdout.
    #[arg(long)]
    json: bool,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Frame source url (overrides config and SMARTSIGN_SOURCE_URL).
    #[arg(long)]
    source: Option<String>,
    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

/// Log sink that also advances the terminal frame counter.
struct ProgressSink {
    inner: LogSink,
    counter: FrameCounter,
}

impl DisplaySink for ProgressSink {
    fn show(&mut self, outcome: &FrameOutcome, counts: &ClassCounts, sign: SignState) -> Result<()> {
        self.counter.tick(sign.message());
        self.inner.show(outcome, counts, sign)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::for_stderr(args.ui);

    let cfg = ui
        .run_stage("loading config", || {
            let mut cfg = SmartsignConfig::load()?;
            if let Some(url) = &args.source {
                cfg.source.url = url.clone();
                cfg.validate()?;
            }
            Ok::<_, smartsign::ConfigurationError>(cfg)
        })
        .context("invalid configuration")?;

    let mut pipeline = ui
        .run_stage("loading detector", || cfg.build_pipeline())
        .context("failed to build detection pipeline")?;
    if pipeline.state() == PipelineState::Disabled {
        log::warn!(
            "detection disabled ({}); frames pass through unannotated",
            pipeline.last_error().unwrap_or("unknown error")
        );
    }

    let mut source = ui
        .run_stage("opening frame source", || {
            let mut source = open_source(&cfg.source.url, cfg.source.loop_playback)?;
            source.connect()?;
            Ok::<_, anyhow::Error>(source)
        })
        .with_context(|| format!("failed to open frame source {}", cfg.source.url))?;

    let capture = CaptureLoop::new(cfg.source.target_fps)
        .with_advisor(cfg.sign_advisor())
        .with_max_frames(args.max_frames);
    let stop = capture.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("error setting Ctrl-C handler")?;

    log::info!(
        "smartsignd running: source={} fps={} confidence={} iou={}",
        cfg.source.url,
        cfg.source.target_fps,
        cfg.thresholds.confidence,
        cfg.thresholds.iou
    );

    let mut sink = ProgressSink {
        inner: LogSink::default().with_json(args.json),
        counter: ui.frame_counter(),
    };
    let stats = capture.run(source.as_mut(), &mut pipeline, &mut sink)?;
    sink.counter.finish();

    let source_stats = source.stats();
    log::info!(
        "stopped after {} frames ({} with detections, {} failed, {} source errors, {} captured from {})",
        stats.frames,
        stats.frames_with_detections,
        stats.failed_frames,
        stats.source_errors,
        source_stats.frames_captured,
        source_stats.url
    );
    Ok(())
}
