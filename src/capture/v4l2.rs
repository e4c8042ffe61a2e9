//! V4L2 capture through memory-mapped buffers.
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use v4l::{
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
    video::Capture,
    Device, FourCC,
};

use super::{
    discovery::{probe_indices, scan_sysfs, KNOWN_CAMERAS, SYSFS_VIDEO},
    CaptureFormat, CaptureSource,
};
use crate::error::{Result, ThermalError};

const BUFFERS: u32 = 4;

fn device_format(dev: &Device) -> std::io::Result<CaptureFormat> {
    let fmt = dev.format()?;
    let params = dev.params()?;
    let interval = params.interval;
    let fps = if interval.numerator > 0 {
        interval.denominator as f64 / interval.numerator as f64
    } else {
        0.
    };
    Ok(CaptureFormat {
        width: fmt.width,
        height: fmt.height,
        fps,
    })
}

/// Locate the camera: sysfs first, then probing.
pub fn discover(expected: &CaptureFormat) -> Result<PathBuf> {
    if let Some(found) = scan_sysfs(Path::new(SYSFS_VIDEO), KNOWN_CAMERAS) {
        return Ok(found.node);
    }
    let probed = probe_indices(KNOWN_CAMERAS, |i| {
        let dev = Device::new(i as usize).ok()?;
        device_format(&dev).ok()
    });
    match probed {
        Some((index, camera)) => {
            debug!("probed {} at index {}", camera.name, index);
            Ok(PathBuf::from(format!("/dev/video{}", index)))
        }
        None => Err(ThermalError::DeviceNotFound(format!(
            "no device with {}x{} @ {} fps",
            expected.width, expected.height, expected.fps
        ))),
    }
}

pub struct V4l2Capture {
    stream: Option<Stream<'static>>,
    format: CaptureFormat,
}

impl V4l2Capture {
    /// Open `path`, requesting raw YUYV at the expected size.
    pub fn open(path: &Path, expected: &CaptureFormat) -> Result<Self> {
        let dev = Device::with_path(path)
            .map_err(|e| ThermalError::DeviceNotFound(format!("{}: {}", path.display(), e)))?;

        let mut fmt = dev.format()?;
        fmt.width = expected.width;
        fmt.height = expected.height;
        fmt.fourcc = FourCC::new(b"YUYV");
        if let Err(e) = dev.set_format(&fmt) {
            warn!("could not set format on {}: {}", path.display(), e);
        }

        let format = device_format(&dev)?;
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, BUFFERS)?;
        Ok(V4l2Capture {
            stream: Some(stream),
            format,
        })
    }
}

impl CaptureSource for V4l2Capture {
    fn describe(&self) -> CaptureFormat {
        self.format
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return Ok(None),
        };
        let (buf, meta) = stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        Ok(Some(buf[..used].to_vec()))
    }

    fn release(&mut self) {
        self.stream = None;
    }
}
