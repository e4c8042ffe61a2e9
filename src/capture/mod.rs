//! Raw frame sources.
//!
//! A source delivers fixed-size frames (both planes stacked)
//! until it reports that no more frames are available.
//! Sources:
//! - [`FrameReader`]: any [`Read`], e.g. a raw dump file or
//!   a pipe
//! - V4L2 devices (feature: `v4l2`)
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde_derive::*;
use tracing::{info, warn};

use crate::{
    error::{Result, ThermalError},
    frame::SensorGeometry,
};

pub mod discovery;
#[cfg(feature = "v4l2")]
pub mod v4l2;

/// Resolution and rate advertised by a capture device. The
/// height covers both stacked planes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl CaptureFormat {
    /// 256x384 @ 25 fps.
    pub const TC001: CaptureFormat = CaptureFormat {
        width: 256,
        height: 384,
        fps: 25.,
    };

    /// Format carrying frames of a sensor geometry.
    pub fn for_geometry(geometry: SensorGeometry, fps: f64) -> Self {
        CaptureFormat {
            width: geometry.width as u32,
            height: 2 * geometry.height as u32,
            fps,
        }
    }

    pub fn matches(&self, other: &CaptureFormat) -> bool {
        self.width == other.width
            && self.height == other.height
            && (self.fps - other.fps).abs() < 1e-3
    }

    pub fn ensure_matches(&self, expected: &CaptureFormat) -> Result<()> {
        if self.matches(expected) {
            Ok(())
        } else {
            Err(ThermalError::FormatMismatch {
                width: self.width,
                height: self.height,
                fps: self.fps,
                expected_width: expected.width,
                expected_height: expected.height,
                expected_fps: expected.fps,
            })
        }
    }
}

/// Which device to open: `-1` auto-discovers, an integer
/// is a device index, anything else a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelector {
    Auto,
    Index(u32),
    Path(PathBuf),
}

impl FromStr for DeviceSelector {
    type Err = ThermalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ThermalError::Config("empty device selector".into()));
        }
        if s == "-1" {
            return Ok(DeviceSelector::Auto);
        }
        Ok(match s.parse::<u32>() {
            Ok(i) => DeviceSelector::Index(i),
            Err(_) => DeviceSelector::Path(s.into()),
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceSelector::Auto => write!(f, "auto"),
            DeviceSelector::Index(i) => write!(f, "/dev/video{}", i),
            DeviceSelector::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// A platform capture backend.
pub trait CaptureSource: Send {
    fn describe(&self) -> CaptureFormat;

    /// Next frame, or `None` when the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>>;

    fn release(&mut self);
}

/// Reads consecutive fixed-size frames from a byte stream.
pub struct FrameReader<R> {
    reader: Option<R>,
    frame_len: usize,
    format: CaptureFormat,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R, geometry: SensorGeometry, fps: f64) -> Self {
        FrameReader {
            reader: Some(reader),
            frame_len: geometry.frame_len(),
            format: CaptureFormat::for_geometry(geometry, fps),
        }
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }
}

impl FrameReader<BufReader<File>> {
    pub fn open(path: &Path, geometry: SensorGeometry, fps: f64) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?), geometry, fps))
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl<R: Read + Send> CaptureSource for FrameReader<R> {
    fn describe(&self) -> CaptureFormat {
        self.format
    }

    /// A truncated trailing frame is reported once as
    /// malformed; the source is exhausted afterwards.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut buf = vec![0; self.frame_len];
        let n = read_full(reader, &mut buf)?;
        if n == self.frame_len {
            return Ok(Some(buf));
        }
        self.reader = None;
        if n == 0 {
            Ok(None)
        } else {
            Err(ThermalError::MalformedFrame {
                expected: self.frame_len,
                actual: n,
            })
        }
    }

    fn release(&mut self) {
        self.reader = None;
    }
}

/// Owns a capture source and releases it exactly once.
pub struct CaptureHandle {
    name: String,
    source: Box<dyn CaptureSource>,
    released: bool,
}

impl CaptureHandle {
    pub fn new(name: &str, source: Box<dyn CaptureSource>) -> Self {
        CaptureHandle {
            name: name.to_string(),
            source,
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn describe(&self) -> CaptureFormat {
        self.source.describe()
    }

    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.released {
            return Ok(None);
        }
        self.source.read_frame()
    }

    /// Release the device; later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.source.release();
        info!("released {}", self.name);
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open a capture source and check its format.
///
/// Regular files are read as raw frame dumps. Devices need
/// the `v4l2` feature.
pub fn open(
    selector: &DeviceSelector,
    geometry: SensorGeometry,
    fps: f64,
) -> Result<CaptureHandle> {
    let expected = CaptureFormat::for_geometry(geometry, fps);

    if let DeviceSelector::Path(path) = selector {
        if path.is_file() {
            info!("reading raw frames from {}", path.display());
            let reader = FrameReader::open(path, geometry, fps)?;
            return Ok(CaptureHandle::new(&selector.to_string(), Box::new(reader)));
        }
    }
    open_device(selector, expected)
}

#[cfg(feature = "v4l2")]
fn open_device(selector: &DeviceSelector, expected: CaptureFormat) -> Result<CaptureHandle> {
    let path = match selector {
        DeviceSelector::Auto => {
            info!("no camera specified, scanning");
            v4l2::discover(&expected)?
        }
        DeviceSelector::Index(i) => PathBuf::from(format!("/dev/video{}", i)),
        DeviceSelector::Path(p) => p.clone(),
    };
    let source = v4l2::V4l2Capture::open(&path, &expected)?;
    source.describe().ensure_matches(&expected)?;
    info!("opened {}", path.display());
    Ok(CaptureHandle::new(&path.display().to_string(), Box::new(source)))
}

#[cfg(not(feature = "v4l2"))]
fn open_device(selector: &DeviceSelector, _expected: CaptureFormat) -> Result<CaptureHandle> {
    warn!("device capture needs the v4l2 feature");
    Err(ThermalError::DeviceNotFound(format!(
        "{} (built without v4l2 support)",
        selector
    )))
}
