//! Capture loop: source -> pipeline -> display, at a fixed cadence.
//!
//! The loop owns no threads. It checks the stop flag at the top of every
//! iteration, so a frame already inside `DetectionPipeline::run` always
//! completes before the loop exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::advisory::{ClassCounts, SignAdvisor, SignState};
use crate::ingest::FrameSource;
use crate::pipeline::{DetectionPipeline, FrameOutcome};

/// Receives every processed frame.
pub trait DisplaySink {
    fn show(&mut self, outcome: &FrameOutcome, counts: &ClassCounts, sign: SignState) -> Result<()>;
}

/// Logs each frame summary and the sign state.
#[derive(Default)]
pub struct LogSink {
    json: bool,
    last_sign: Option<SignState>,
}

impl LogSink {
    /// Also print per-class counts as one JSON object per frame to stdout.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

impl DisplaySink for LogSink {
    fn show(&mut self, outcome: &FrameOutcome, counts: &ClassCounts, sign: SignState) -> Result<()> {
        if self.last_sign != Some(sign) {
            log::info!("sign: {}", sign.message());
            self.last_sign = Some(sign);
        }
        if outcome.status.is_ok() {
            log::debug!("{}", outcome.summary);
        } else {
            log::warn!("{}", outcome.status);
        }
        if self.json {
            println!("{}", counts.to_json());
        }
        Ok(())
    }
}

/// Clonable handle that asks a running loop to stop.
#[derive(Clone, Debug)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub frames_with_detections: u64,
    pub failed_frames: u64,
    pub source_errors: u64,
}

pub struct CaptureLoop {
    interval: Duration,
    stop: Arc<AtomicBool>,
    advisor: SignAdvisor,
    max_frames: Option<u64>,
}

impl CaptureLoop {
    /// Loop running at `target_fps` frames per second; zero means unpaced.
    pub fn new(target_fps: u32) -> Self {
        let interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / target_fps
        };
        Self {
            interval,
            stop: Arc::new(AtomicBool::new(false)),
            advisor: SignAdvisor::default(),
            max_frames: None,
        }
    }

    pub fn with_advisor(mut self, advisor: SignAdvisor) -> Self {
        self.advisor = advisor;
        self
    }

    /// Ends the loop after this many frames.
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Runs until stopped, the frame limit is reached or the source ends.
    ///
    /// Source errors are logged and the loop moves on to the next frame.
    /// Only a failing sink ends the loop with an error.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        pipeline: &mut DetectionPipeline,
        sink: &mut dyn DisplaySink,
    ) -> Result<LoopStats> {
        let mut stats = LoopStats::default();

        while !self.stop.load(Ordering::SeqCst) {
            if self.max_frames.is_some_and(|max| stats.frames >= max) {
                log::info!("frame limit reached ({})", stats.frames);
                break;
            }
            let tick = Instant::now();

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source exhausted after {} frames", stats.frames);
                    break;
                }
                Err(err) => {
                    stats.source_errors += 1;
                    log::warn!("frame source error: {:#}", err);
                    self.pace(tick);
                    continue;
                }
            };

            let outcome = pipeline.run(&frame);
            stats.frames += 1;
            if !outcome.status.is_ok() {
                stats.failed_frames += 1;
            }
            if !outcome.results.is_empty() {
                stats.frames_with_detections += 1;
            }

            let counts = ClassCounts::from_results(&outcome.results);
            let sign = self.advisor.advise(&counts);
            sink.show(&outcome, &counts, sign)
                .context("display sink failed")?;

            self.pace(tick);
        }

        Ok(stats)
    }

    fn pace(&self, tick: Instant) {
        if let Some(remaining) = self.interval.checked_sub(tick.elapsed()) {
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ClassNameTable, RawOutput, StubBackend};
    use crate::frame::{Frame, PixelFormat};
    use crate::ingest::SourceStats;
    use crate::pipeline::PipelineConfig;
    use anyhow::anyhow;

    struct ScriptedSource {
        frames: Vec<Result<Option<Frame>>>,
    }

    impl FrameSource for ScriptedSource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.frames.is_empty() {
                return Ok(None);
            }
            self.frames.remove(0)
        }

        fn stats(&self) -> SourceStats {
            SourceStats::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        signs: Vec<SignState>,
        counts: Vec<String>,
        stop_after: Option<(usize, StopHandle)>,
    }

    impl DisplaySink for Recorder {
        fn show(&mut self, _: &FrameOutcome, counts: &ClassCounts, sign: SignState) -> Result<()> {
            self.signs.push(sign);
            self.counts.push(counts.to_json());
            if let Some((after, handle)) = &self.stop_after {
                if self.signs.len() >= *after {
                    handle.stop();
                }
            }
            Ok(())
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, PixelFormat::Rgb24)
    }

    /// Pipeline whose model always sees one traffic light.
    fn pipeline() -> DetectionPipeline {
        let config = PipelineConfig {
            input_width: 8,
            input_height: 8,
            ..PipelineConfig::default()
        };
        let classes = ClassNameTable::from_names(["traffic light"]);
        let mut pipeline = DetectionPipeline::new(config, classes).unwrap();
        let output = RawOutput::new(vec![1, 5, 1], vec![4.0, 4.0, 2.0, 2.0, 0.9]);
        pipeline.initialize(Ok(Box::new(StubBackend::new((8, 8), output))));
        pipeline
    }

    #[test]
    fn runs_until_source_is_exhausted_and_skips_source_errors() {
        let mut source = ScriptedSource {
            frames: vec![
                Ok(Some(frame())),
                Err(anyhow!("decode failed")),
                Ok(Some(frame())),
            ],
        };
        let mut sink = Recorder::default();
        let stats = CaptureLoop::new(0)
            .run(&mut source, &mut pipeline(), &mut sink)
            .unwrap();

        assert_eq!(
            stats,
            LoopStats {
                frames: 2,
                frames_with_detections: 2,
                failed_frames: 0,
                source_errors: 1,
            }
        );
        assert_eq!(sink.signs, vec![SignState::TrafficLights; 2]);
        assert_eq!(sink.counts[0], r#"{"traffic light":1}"#);
    }

    #[test]
    fn stop_is_observed_at_the_top_of_the_next_iteration() {
        let capture = CaptureLoop::new(0);
        let mut source = ScriptedSource {
            frames: (0..10).map(|_| Ok(Some(frame()))).collect(),
        };
        let mut sink = Recorder {
            stop_after: Some((3, capture.stop_handle())),
            ..Recorder::default()
        };

        let stats = capture.run(&mut source, &mut pipeline(), &mut sink).unwrap();
        assert_eq!(stats.frames, 3);
        assert!(capture.stop_handle().is_stopped());
    }

    #[test]
    fn frame_limit_and_pacing() {
        let capture = CaptureLoop::new(100).with_max_frames(Some(3));
        assert_eq!(capture.interval(), Duration::from_millis(10));

        let mut source = ScriptedSource {
            frames: (0..10).map(|_| Ok(Some(frame()))).collect(),
        };
        let started = Instant::now();
        let stats = capture
            .run(&mut source, &mut pipeline(), &mut Recorder::default())
            .unwrap();
        assert_eq!(stats.frames, 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn disabled_pipeline_keeps_the_loop_running() {
        let mut disabled = DetectionPipeline::new(
            PipelineConfig::default(),
            ClassNameTable::default(),
        )
        .unwrap();
        disabled.initialize(Err(crate::error::InferenceError::NotInitialized));

        let mut source = ScriptedSource {
            frames: vec![Ok(Some(frame())), Ok(Some(frame()))],
        };
        let mut sink = Recorder::default();
        let stats = CaptureLoop::new(0)
            .run(&mut source, &mut disabled, &mut sink)
            .unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.failed_frames, 2);
        assert_eq!(sink.signs, vec![SignState::Ok; 2]);
    }
}
