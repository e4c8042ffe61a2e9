//! Error taxonomy for the capture, decode, render and
//! recording stages.
//!
//! Only [`DeviceNotFound`](ThermalError::DeviceNotFound)
//! and [`FormatMismatch`](ThermalError::FormatMismatch) are
//! fatal. Everything else is contained to a single frame or
//! a single recording session by the frame loop.
use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThermalError {
    #[error("could not find a matching thermal camera: {0}")]
    DeviceNotFound(String),

    #[error("device format mismatch: got {width}x{height}@{fps:.1}, expected {expected_width}x{expected_height}@{expected_fps:.1}")]
    FormatMismatch {
        width: u32,
        height: u32,
        fps: f64,
        expected_width: u32,
        expected_height: u32,
        expected_fps: f64,
    },

    #[error("malformed frame: expected {expected} bytes, found {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("plane is {actual_width}x{actual_height}, renderer expects {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("recording write failed: {0}")]
    RecordingWrite(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no statistics available yet")]
    NoStatistics,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("png encoding error: {0}")]
    Png(#[from] png::EncodingError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl ThermalError {
    /// Whether the error must abort startup rather than
    /// being contained to one frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ThermalError::DeviceNotFound(_) | ThermalError::FormatMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ThermalError>;
