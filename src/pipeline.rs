//! The per-frame loop: read, decode, measure, render,
//! record and hand the result to a sink.
//!
//! Fatal errors (no device, wrong device format) end the
//! loop. Everything else is contained: a bad frame is
//! skipped and a failing recording is stopped.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use chrono::Local;
use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::{
    capture::CaptureHandle,
    config::Settings,
    decode::{PlaneSet, ThermalFrameDecoder},
    error::{Result, ThermalError},
    record::{write_snapshot, RecordingArtifacts, RecordingSession, SnapshotArtifact},
    render::HeatmapRenderer,
    session::{RenderConfig, SessionState},
    stats::{FrameStatistics, TemperatureStatistics},
    stream::FrameThrottle,
    temperature::Calibration,
};

/// Consecutive IO errors from the source after which it is
/// considered gone. Malformed frames never end the loop.
pub const MAX_READ_FAILURES: usize = 50;

/// While frames keep failing, a warning is logged once per
/// this many skips.
const SKIP_LOG_INTERVAL: usize = 25;

/// Everything produced for one frame.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub image: RgbImage,
    pub stats: FrameStatistics,
    pub planes: PlaneSet,
    pub config: RenderConfig,
    pub snapshot: Option<SnapshotArtifact>,
}

/// Result of one loop iteration.
#[derive(Debug)]
pub enum Step {
    Frame(Box<FrameOutput>),
    Skipped(ThermalError),
    Finished,
}

pub struct FrameLoop {
    session: Arc<SessionState>,
    decoder: ThermalFrameDecoder,
    statistics: TemperatureStatistics,
    renderer: HeatmapRenderer,
    precision: u32,
    output_dir: PathBuf,
    slug: String,
    recording: Option<RecordingSession>,
    record_throttle: FrameThrottle,
    record_fps: f64,
    frames: usize,
}

impl FrameLoop {
    pub fn new(settings: &Settings, session: Arc<SessionState>) -> Self {
        FrameLoop {
            session,
            decoder: ThermalFrameDecoder::new(settings.geometry(), settings.calibration()),
            statistics: TemperatureStatistics::new(settings.precision),
            renderer: HeatmapRenderer::new(&settings.unit),
            precision: settings.precision,
            output_dir: settings.output_dir.clone(),
            slug: settings.file_slug.clone(),
            recording: None,
            record_throttle: FrameThrottle::new(settings.record_fps),
            record_fps: settings.record_fps,
            frames: 0,
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Frames processed successfully so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Decode and render one raw frame under the current
    /// session state.
    pub fn process(&mut self, bytes: Vec<u8>) -> Result<FrameOutput> {
        let started = Instant::now();
        let config = self.session.render_config();
        self.decoder.set_transform(config.transform());
        self.decoder
            .set_calibration(Calibration::new(self.session.temp_offset(), self.precision));

        let planes = self.decoder.decode_bytes(bytes)?;
        let stats = self.statistics.compute(
            planes.temperature.view(),
            self.session.target(),
            config.display_geometry(),
        );
        self.session.set_last_stats(stats);
        let decoded = started.elapsed();

        self.sync_recording(&config);
        let status = self.session.hud_status();
        let image = self
            .renderer
            .render(planes.image.view(), &stats, &config, &status)?;

        self.record(&image, &stats);
        let snapshot = if self.session.take_snapshot_request() {
            self.snapshot(&image, &planes, &stats)
        } else {
            None
        };

        self.frames += 1;
        debug!(
            "frame {}: decode {:?}, total {:?}",
            self.frames,
            decoded,
            started.elapsed()
        );
        Ok(FrameOutput {
            image,
            stats,
            planes,
            config,
            snapshot,
        })
    }

    fn sync_recording(&mut self, config: &RenderConfig) {
        let requested = self.session.recording_requested();
        if requested && self.recording.is_none() {
            let size = config.display_geometry();
            match RecordingSession::start(&self.output_dir, &self.slug, size, &Local::now()) {
                Ok(rec) => {
                    info!(
                        "recording {}x{} at up to {} fps",
                        size.width, size.height, self.record_fps
                    );
                    self.recording = Some(rec);
                    self.record_throttle = FrameThrottle::new(self.record_fps);
                    self.session.set_recording(true);
                }
                Err(e) => {
                    warn!("could not start recording: {}", e);
                    self.session.set_recording(false);
                }
            }
        } else if !requested && self.recording.is_some() {
            self.stop_recording();
        }
    }

    fn record(&mut self, image: &RgbImage, stats: &FrameStatistics) {
        let rec = match self.recording.as_mut() {
            Some(rec) => rec,
            None => return,
        };
        if self.record_throttle.ready() {
            if let Err(e) = rec.add_frame(image, stats) {
                warn!("stopping recording: {}", e);
                self.stop_recording();
                return;
            }
        }
        self.session.set_elapsed(rec.elapsed());
    }

    fn snapshot(
        &self,
        image: &RgbImage,
        planes: &PlaneSet,
        stats: &FrameStatistics,
    ) -> Option<SnapshotArtifact> {
        match write_snapshot(
            &self.output_dir,
            &self.slug,
            &Local::now(),
            image,
            planes.temperature.view(),
            Some(stats),
        ) {
            Ok(snap) => {
                self.session.set_snapshot_time(snap.time.clone());
                Some(snap)
            }
            Err(e) => {
                warn!("snapshot failed: {}", e);
                None
            }
        }
    }

    /// Finish the active recording, if any, and mark the
    /// session idle.
    pub fn stop_recording(&mut self) -> Option<RecordingArtifacts> {
        let rec = self.recording.take()?;
        self.session.set_recording(false);
        match rec.finish() {
            Ok(artifacts) => Some(artifacts),
            Err(e) => {
                warn!("recording could not be saved: {}", e);
                None
            }
        }
    }

    /// Read and process the next frame.
    pub fn step(&mut self, capture: &mut CaptureHandle) -> Result<Step> {
        let bytes = match capture.read_frame() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(Step::Finished),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(Step::Skipped(e)),
        };
        match self.process(bytes) {
            Ok(out) => Ok(Step::Frame(Box::new(out))),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Step::Skipped(e)),
        }
    }

    /// Run until the source is exhausted, a stop is
    /// requested, or `sink` fails. The recording is flushed
    /// and the capture released on every exit path.
    pub fn run<F>(&mut self, capture: &mut CaptureHandle, mut sink: F) -> Result<usize>
    where
        F: FnMut(&FrameOutput) -> Result<()>,
    {
        let result = self.run_inner(capture, &mut sink);
        self.stop_recording();
        capture.release();
        result
    }

    fn run_inner<F>(&mut self, capture: &mut CaptureHandle, sink: &mut F) -> Result<usize>
    where
        F: FnMut(&FrameOutput) -> Result<()>,
    {
        let mut delivered = 0;
        let mut skipped = 0;
        let mut io_failures = 0;
        while !self.session.stop_requested() {
            match self.step(capture)? {
                Step::Frame(out) => {
                    if skipped > 0 {
                        info!("recovered after {} skipped frames", skipped);
                    }
                    skipped = 0;
                    io_failures = 0;
                    sink(&out)?;
                    delivered += 1;
                }
                Step::Skipped(e) => {
                    skipped += 1;
                    if let ThermalError::DimensionMismatch { .. } = e {
                        error!("skipping frame: {}", e);
                    } else if skipped == 1 || skipped % SKIP_LOG_INTERVAL == 0 {
                        warn!("skipping frame ({} in a row): {}", skipped, e);
                    } else {
                        debug!("skipping frame: {}", e);
                    }
                    if let ThermalError::Io(_) = e {
                        io_failures += 1;
                        if io_failures >= MAX_READ_FAILURES {
                            error!("giving up after {} read errors", io_failures);
                            return Err(e);
                        }
                    } else {
                        io_failures = 0;
                    }
                }
                Step::Finished => {
                    info!("no more frames");
                    break;
                }
            }
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{CaptureFormat, CaptureSource, FrameReader},
        decode::tests::synthetic_frame,
        record::StatsRecord,
        frame::SensorGeometry,
        session::{Command, HudMode},
    };
    use std::{collections::VecDeque, io::Cursor};

    /// Replays a fixed list of read results.
    struct Scripted(VecDeque<Result<Option<Vec<u8>>>>);

    impl CaptureSource for Scripted {
        fn describe(&self) -> CaptureFormat {
            CaptureFormat::TC001
        }

        fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }

        fn release(&mut self) {
            self.0.clear();
        }
    }

    fn io_error() -> ThermalError {
        std::io::Error::new(std::io::ErrorKind::Other, "device hiccup").into()
    }

    fn small_settings(dir: &Path) -> Settings {
        Settings {
            width: 16,
            height: 12,
            scale: 2,
            hud: HudMode::All,
            output_dir: dir.to_owned(),
            record_fps: 0.,
            ..Settings::default()
        }
    }

    fn frames(settings: &Settings, n: usize) -> CaptureHandle {
        let mut bytes = vec![];
        for _ in 0..n {
            bytes.extend(synthetic_frame(settings.geometry()));
        }
        let reader = FrameReader::new(Cursor::new(bytes), settings.geometry(), 25.);
        CaptureHandle::new("test", Box::new(reader))
    }

    #[test]
    fn processes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session.clone());
        let mut capture = frames(&settings, 4);

        let mut sizes = vec![];
        let n = pipeline
            .run(&mut capture, |out| {
                sizes.push(out.image.dimensions());
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(sizes, vec![(32, 24); 4]);
        assert!(capture.is_released());
        assert!(session.last_stats().is_some());
    }

    #[test]
    fn rotation_reaches_the_next_frame() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session.clone());

        session.apply(Command::CycleRotation).unwrap();
        let out = pipeline.process(synthetic_frame(settings.geometry())).unwrap();
        assert_eq!(out.planes.geometry(), SensorGeometry { width: 12, height: 16 });
        assert_eq!(out.image.dimensions(), (24, 32));
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session);
        assert!(matches!(
            pipeline.process(vec![0; 5]),
            Err(ThermalError::MalformedFrame { .. })
        ));
        assert!(pipeline.process(synthetic_frame(settings.geometry())).is_ok());
    }

    #[test]
    fn recording_follows_the_session_flag() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session.clone());
        let frame = || synthetic_frame(settings.geometry());

        session.apply(Command::ToggleRecording).unwrap();
        for _ in 0..3 {
            pipeline.process(frame()).unwrap();
        }
        assert!(session.is_recording());
        session.apply(Command::ToggleRecording).unwrap();
        pipeline.process(frame()).unwrap();
        assert!(!session.is_recording());
        assert!(!pipeline.is_recording());
    }

    #[test]
    fn snapshot_is_taken_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session.clone());

        session.apply(Command::Snapshot).unwrap();
        let out = pipeline.process(synthetic_frame(settings.geometry())).unwrap();
        let snap = out.snapshot.unwrap();
        assert!(snap.image.exists() && snap.grid.exists());
        assert_eq!(session.hud_status().snapshot_time, Some(snap.time));

        let out = pipeline.process(synthetic_frame(settings.geometry())).unwrap();
        assert!(out.snapshot.is_none());
    }

    #[test]
    fn stop_request_ends_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session.clone());
        let mut capture = frames(&settings, 10);

        let n = pipeline
            .run(&mut capture, |_| {
                session.apply(Command::Stop)?;
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 1);
        assert!(capture.is_released());
    }

    #[test]
    fn glitch_burst_does_not_end_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session);

        let mut reads: VecDeque<_> = (0..MAX_READ_FAILURES + 5)
            .map(|_| Ok(Some(vec![0u8; 10])))
            .collect();
        reads.push_back(Err(io_error()));
        reads.push_back(Ok(Some(vec![0u8; 3])));
        reads.extend((0..15).map(|_| Ok(Some(synthetic_frame(settings.geometry())))));
        let mut capture = CaptureHandle::new("glitchy", Box::new(Scripted(reads)));

        let n = pipeline.run(&mut capture, |_| Ok(())).unwrap();
        assert_eq!(n, 15);
        assert_eq!(pipeline.frames(), 15);
    }

    #[test]
    fn repeated_read_errors_end_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session);

        let mut reads: VecDeque<_> = VecDeque::new();
        reads.push_back(Ok(Some(synthetic_frame(settings.geometry()))));
        reads.extend((0..MAX_READ_FAILURES).map(|_| Err(io_error())));
        reads.push_back(Ok(Some(synthetic_frame(settings.geometry()))));
        let mut capture = CaptureHandle::new("failing", Box::new(Scripted(reads)));

        let mut delivered = 0;
        let result = pipeline.run(&mut capture, |_| {
            delivered += 1;
            Ok(())
        });
        assert!(matches!(result, Err(ThermalError::Io(_))));
        assert_eq!(delivered, 1);
        assert!(capture.is_released());
    }

    #[test]
    fn stop_during_recording_writes_the_stats_table() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings(dir.path());
        let session = Arc::new(settings.session());
        let mut pipeline = FrameLoop::new(&settings, session.clone());
        let mut capture = frames(&settings, 20);

        session.apply(Command::ToggleRecording).unwrap();
        let mut seen = 0;
        let n = pipeline
            .run(&mut capture, |_| {
                seen += 1;
                if seen == 4 {
                    session.request_stop();
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 4);
        assert!(!pipeline.is_recording());
        assert!(!session.is_recording());

        let table = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.to_string_lossy().ends_with("_stats.csv"))
            .unwrap();
        let rows: Vec<StatsRecord> = csv::Reader::from_path(&table)
            .unwrap()
            .deserialize()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 4);
    }
}
