//! Recording sessions, snapshots and the artifact store.
//!
//! All artifacts of one capture share a name of the form
//! `<slug>_<YYYYmmdd-HHMMSS>` in the output directory.
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use image::RgbImage;
use ndarray::ArrayView2;
use serde_derive::*;
use tracing::{info, warn};

use crate::{
    error::{Result, ThermalError},
    frame::SensorGeometry,
    stats::FrameStatistics,
    stream::{encode_jpeg, DEFAULT_QUALITY},
};

pub const VIDEO_EXTENSION: &str = "mjpeg";
pub const ARTIFACT_EXTENSIONS: [&str; 3] = ["csv", VIDEO_EXTENSION, "png"];

pub fn timestamp(now: &DateTime<Local>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}

fn artifact_base(dir: &Path, slug: &str, now: &DateTime<Local>) -> PathBuf {
    dir.join(format!("{}_{}", slug, timestamp(now)))
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Destination of recorded display frames.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Motion-JPEG file: concatenated JPEG images at a fixed
/// resolution.
pub struct MjpegFileSink {
    path: PathBuf,
    size: (u32, u32),
    writer: BufWriter<File>,
}

impl MjpegFileSink {
    pub fn create(path: &Path, size: SensorGeometry) -> Result<Self> {
        Ok(MjpegFileSink {
            path: path.to_owned(),
            size: (size.width as u32, size.height as u32),
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSink for MjpegFileSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != self.size {
            return Err(ThermalError::RecordingWrite(format!(
                "frame is {}x{}, recording is {}x{}",
                frame.width(),
                frame.height(),
                self.size.0,
                self.size.1
            )));
        }
        let jpeg = encode_jpeg(frame, DEFAULT_QUALITY)?;
        self.writer
            .write_all(&jpeg)
            .map_err(|e| ThermalError::RecordingWrite(e.to_string()))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| ThermalError::RecordingWrite(e.to_string()))
    }
}

/// One row of a statistics table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub elapsed: f64,
    pub max: f64,
    pub min: f64,
    pub average: f64,
    pub target: f64,
    pub max_row: usize,
    pub max_col: usize,
    pub min_row: usize,
    pub min_col: usize,
    pub target_row: usize,
    pub target_col: usize,
}

impl StatsRecord {
    pub fn new(stats: &FrameStatistics, elapsed: Duration) -> Self {
        StatsRecord {
            elapsed: elapsed.as_secs_f64(),
            max: stats.max,
            min: stats.min,
            average: stats.average,
            target: stats.target,
            max_row: stats.max_pos.row,
            max_col: stats.max_pos.col,
            min_row: stats.min_pos.row,
            min_col: stats.min_pos.col,
            target_row: stats.target_pos.row,
            target_col: stats.target_pos.col,
        }
    }
}

pub fn write_stats_csv(path: &Path, records: &[StatsRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in records {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Files produced by a finished recording.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingArtifacts {
    pub video: PathBuf,
    pub stats: PathBuf,
    pub frames: usize,
}

/// An active recording. Owned by the frame loop.
pub struct RecordingSession {
    started: Instant,
    video: PathBuf,
    stats_path: PathBuf,
    sink: Box<dyn VideoSink>,
    records: Vec<StatsRecord>,
}

impl RecordingSession {
    /// Start recording `size` frames into `dir`.
    pub fn start(
        dir: &Path,
        slug: &str,
        size: SensorGeometry,
        now: &DateTime<Local>,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let base = artifact_base(dir, slug, now);
        let video = base.with_extension(VIDEO_EXTENSION);
        let sink = MjpegFileSink::create(&video, size)?;
        Ok(Self::with_sink(Box::new(sink), video, with_suffix(&base, "_stats.csv")))
    }

    pub fn with_sink(sink: Box<dyn VideoSink>, video: PathBuf, stats_path: PathBuf) -> Self {
        info!("recording to {}", video.display());
        RecordingSession {
            started: Instant::now(),
            video,
            stats_path,
            sink,
            records: vec![],
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn frames(&self) -> usize {
        self.records.len()
    }

    /// Append a frame. On error nothing is recorded for the
    /// frame and the session should be finished.
    pub fn add_frame(&mut self, frame: &RgbImage, stats: &FrameStatistics) -> Result<()> {
        let elapsed = self.elapsed();
        self.sink.write_frame(frame)?;
        self.records.push(StatsRecord::new(stats, elapsed));
        Ok(())
    }

    /// Close the video and write the statistics table.
    pub fn finish(mut self) -> Result<RecordingArtifacts> {
        let flushed = self.sink.finish();
        write_stats_csv(&self.stats_path, &self.records)?;
        flushed?;
        info!(
            "recording stopped after {} frames ({:.1}s)",
            self.records.len(),
            self.elapsed().as_secs_f64()
        );
        Ok(RecordingArtifacts {
            video: self.video,
            stats: self.stats_path,
            frames: self.records.len(),
        })
    }
}

/// Files produced by a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotArtifact {
    pub image: PathBuf,
    pub grid: PathBuf,
    pub summary: Option<PathBuf>,
    /// Wall-clock time shown on the HUD.
    pub time: String,
}

pub fn write_png(path: &Path, image: &RgbImage) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(writer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(image.as_raw())?;
    writer.finish()?;
    Ok(())
}

/// Temperature grid with a header row of column numbers
/// and a leading column of row numbers, both from 1.
pub fn write_grid_csv(path: &Path, field: ArrayView2<f64>) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let header = std::iter::once(String::new()).chain((1..=field.ncols()).map(|c| c.to_string()));
    wtr.write_record(header)?;
    for (r, row) in field.outer_iter().enumerate() {
        let record = std::iter::once((r + 1).to_string()).chain(row.iter().map(|v| v.to_string()));
        wtr.write_record(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the image, the temperature grid and, when
/// statistics are given, a one-row summary.
pub fn write_snapshot(
    dir: &Path,
    slug: &str,
    now: &DateTime<Local>,
    image: &RgbImage,
    field: ArrayView2<f64>,
    stats: Option<&FrameStatistics>,
) -> Result<SnapshotArtifact> {
    fs::create_dir_all(dir)?;
    let base = artifact_base(dir, slug, now);
    let image_path = base.with_extension("png");
    let grid = base.with_extension("csv");

    write_png(&image_path, image)?;
    write_grid_csv(&grid, field)?;

    let summary = match stats {
        Some(stats) => {
            let path = with_suffix(&base, "_summary.csv");
            write_stats_csv(&path, &[StatsRecord::new(stats, Duration::default())])?;
            Some(path)
        }
        None => None,
    };

    info!("snapshot {}", image_path.display());
    Ok(SnapshotArtifact {
        image: image_path,
        grid,
        summary,
        time: now.format("%H:%M:%S").to_string(),
    })
}

/// A file in the artifact store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub ending: String,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Recordings and snapshots in the output directory.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    slug: String,
}

impl ArtifactStore {
    pub fn open(dir: &Path, slug: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(ArtifactStore {
            dir: dir.to_owned(),
            slug: slug.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifacts sorted by file name.
    pub fn list(&self) -> Result<Vec<Artifact>> {
        let pattern = format!(
            "{}/{}*",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            glob::Pattern::escape(&self.slug)
        );
        let paths = glob::glob(&pattern).map_err(|e| ThermalError::Config(e.to_string()))?;

        let mut artifacts = vec![];
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("skipping unreadable artifact: {}", e);
                    continue;
                }
            };
            let ending = match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ARTIFACT_EXTENSIONS.contains(&ext) => ext.to_string(),
                _ => continue,
            };
            let (name, filename) = match (
                path.file_stem().and_then(|s| s.to_str()),
                path.file_name().and_then(|s| s.to_str()),
            ) {
                (Some(stem), Some(file)) => (stem.to_string(), file.to_string()),
                _ => continue,
            };
            artifacts.push(Artifact {
                name,
                ending,
                filename,
                path,
            });
        }
        artifacts.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(artifacts)
    }

    pub fn get(&self, filename: &str) -> Result<Option<Artifact>> {
        Ok(self.list()?.into_iter().find(|a| a.filename == filename))
    }

    /// Delete an artifact; `false` when it does not exist.
    pub fn delete(&self, filename: &str) -> Result<bool> {
        match self.get(filename)? {
            Some(artifact) => {
                fs::remove_file(&artifact.path)?;
                info!("deleted {}", artifact.filename);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{DisplayPositions, PixelPos};
    use chrono::TimeZone;
    use image::Rgb;
    use ndarray::Array2;

    fn fixed_time() -> DateTime<Local> {
        Local.ymd(2024, 3, 9).and_hms(14, 5, 7)
    }

    fn stats() -> FrameStatistics {
        FrameStatistics {
            max: 30.5,
            min: 20.25,
            average: 24.,
            target: 23.5,
            max_pos: PixelPos::new(1, 2),
            min_pos: PixelPos::new(3, 4),
            target_pos: PixelPos::new(5, 6),
            display: DisplayPositions::default(),
        }
    }

    #[test]
    fn names_share_timestamp() {
        assert_eq!(timestamp(&fixed_time()), "20240309-140507");
        let base = artifact_base(Path::new("out"), "TC001", &fixed_time());
        assert_eq!(base, Path::new("out/TC001_20240309-140507"));
        assert_eq!(
            with_suffix(&base, "_stats.csv"),
            Path::new("out/TC001_20240309-140507_stats.csv")
        );
    }

    #[test]
    fn snapshot_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::from_pixel(4, 3, Rgb([1, 2, 3]));
        let mut field = Array2::from_elem((3, 4), 21.5);
        field[(2, 3)] = 30.;

        let snap = write_snapshot(
            dir.path(),
            "TC001",
            &fixed_time(),
            &img,
            field.view(),
            Some(&stats()),
        )
        .unwrap();
        assert_eq!(snap.time, "14:05:07");
        assert!(snap.image.exists());

        let grid = fs::read_to_string(&snap.grid).unwrap();
        let lines: Vec<_> = grid.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], ",1,2,3,4");
        assert_eq!(lines[3], "3,21.5,21.5,21.5,30");

        let summary = fs::read_to_string(snap.summary.unwrap()).unwrap();
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.starts_with("elapsed,max,min,average,target"));

        let decoded = image::open(&snap.image).unwrap().to_rgb8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn snapshot_without_stats_has_no_summary() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbImage::new(2, 2);
        let field = Array2::zeros((2, 2));
        let snap =
            write_snapshot(dir.path(), "TC001", &fixed_time(), &img, field.view(), None).unwrap();
        assert_eq!(snap.summary, None);
    }

    #[test]
    fn recording_writes_video_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let size = SensorGeometry {
            width: 8,
            height: 6,
        };
        let mut rec = RecordingSession::start(dir.path(), "TC001", size, &fixed_time()).unwrap();
        let frame = RgbImage::from_pixel(8, 6, Rgb([9, 9, 9]));
        for _ in 0..3 {
            rec.add_frame(&frame, &stats()).unwrap();
        }
        assert_eq!(rec.frames(), 3);
        let out = rec.finish().unwrap();
        assert_eq!(out.frames, 3);
        assert!(fs::metadata(&out.video).unwrap().len() > 0);

        let mut rdr = csv::Reader::from_path(&out.stats).unwrap();
        let rows: Vec<StatsRecord> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].max_row, 1);
        assert!(rows[2].elapsed >= rows[0].elapsed);
    }

    #[test]
    fn wrong_size_frame_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let size = SensorGeometry {
            width: 8,
            height: 6,
        };
        let mut rec = RecordingSession::start(dir.path(), "TC001", size, &fixed_time()).unwrap();
        let err = rec.add_frame(&RgbImage::new(16, 12), &stats()).unwrap_err();
        assert!(matches!(err, ThermalError::RecordingWrite(_)));
        assert_eq!(rec.frames(), 0);
    }

    #[test]
    fn store_lists_gets_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        for name in &["TC001_b.png", "TC001_a.csv", "TC001_c.txt", "other.png", "TC001_d.mjpeg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let store = ArtifactStore::open(dir.path(), "TC001").unwrap();
        let names: Vec<_> = store.list().unwrap().into_iter().map(|a| a.filename).collect();
        assert_eq!(names, vec!["TC001_a.csv", "TC001_b.png", "TC001_d.mjpeg"]);

        let a = store.get("TC001_b.png").unwrap().unwrap();
        assert_eq!(a.name, "TC001_b");
        assert_eq!(a.ending, "png");
        assert!(store.get("other.png").unwrap().is_none());

        assert!(store.delete("TC001_b.png").unwrap());
        assert!(!store.delete("TC001_b.png").unwrap());
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
