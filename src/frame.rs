//! Raw sensor frames and their geometry.
//!
//! The camera delivers one tall YUYV frame per capture:
//! the top half is the image plane (`H x W` pixels, two
//! bytes each) and the bottom half is the calibration
//! plane with the same shape, where byte 0 of each pixel is
//! the low-order and byte 1 the high-order part of the raw
//! reading.
use serde_derive::*;

use crate::error::{Result, ThermalError};

/// Bytes per pixel in both planes.
pub const BYTES_PER_PIXEL: usize = 2;

/// Width/height of one plane of the sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorGeometry {
    pub width: usize,
    pub height: usize,
}

impl SensorGeometry {
    /// 256x192 sensor of the TC001 / P2 Pro.
    pub const TC001: SensorGeometry = SensorGeometry {
        width: 256,
        height: 192,
    };

    pub fn plane_len(&self) -> usize {
        self.width * self.height * BYTES_PER_PIXEL
    }

    /// Byte length of a complete frame (both planes).
    pub fn frame_len(&self) -> usize {
        2 * self.plane_len()
    }

    /// Geometry with width and height exchanged.
    pub fn transposed(&self) -> Self {
        SensorGeometry {
            width: self.height,
            height: self.width,
        }
    }
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self::TC001
    }
}

/// A validated raw capture.
#[derive(Clone, Debug)]
pub struct RawFrame {
    geometry: SensorGeometry,
    data: Vec<u8>,
}

impl RawFrame {
    pub fn new(geometry: SensorGeometry, data: Vec<u8>) -> Result<Self> {
        let expected = geometry.frame_len();
        if data.len() != expected {
            return Err(ThermalError::MalformedFrame {
                expected,
                actual: data.len(),
            });
        }
        Ok(RawFrame { geometry, data })
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.geometry
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.data[..self.geometry.plane_len()]
    }

    pub fn calibration_bytes(&self) -> &[u8] {
        &self.data[self.geometry.plane_len()..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
