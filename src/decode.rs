//! Split raw frames into the image plane and the
//! temperature field, and keep both in sync under
//! rotation and mirroring.
use byteordered::ByteOrdered;
use ndarray::{s, Array2, Array3, ArrayBase, Data, Dimension};
use serde_derive::*;

use crate::{
    error::{Result, ThermalError},
    frame::{RawFrame, SensorGeometry, BYTES_PER_PIXEL},
    temperature::Calibration,
};

/// Quarter-turn rotations, in the order the control
/// surface cycles through them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    None,
    Cw90,
    Rotate180,
    Ccw90,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Cw90,
        Rotation::Rotate180,
        Rotation::Ccw90,
    ];

    /// Whether the rotation exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Ccw90)
    }

    pub fn label(self) -> &'static str {
        match self {
            Rotation::None => "0",
            Rotation::Cw90 => "90 CW",
            Rotation::Rotate180 => "180",
            Rotation::Ccw90 => "90 CCW",
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::None
    }
}

/// Geometric transform applied to every decoded frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub rotation: Rotation,
    pub flip: bool,
}

impl Transform {
    /// Geometry of the planes after the transform.
    pub fn apply_to(&self, geometry: SensorGeometry) -> SensorGeometry {
        if self.rotation.swaps_axes() {
            geometry.transposed()
        } else {
            geometry
        }
    }
}

/// The image plane (`rows x cols x 2` YUYV bytes) and the
/// temperature field (`rows x cols` Celsius values) of one
/// frame. Both always share the same rows/cols.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneSet {
    pub image: Array3<u8>,
    pub temperature: Array2<f64>,
}

impl PlaneSet {
    pub fn width(&self) -> usize {
        self.temperature.ncols()
    }

    pub fn height(&self) -> usize {
        self.temperature.nrows()
    }

    pub fn geometry(&self) -> SensorGeometry {
        SensorGeometry {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Rotate both planes. Quarter turns swap the reported
    /// width and height.
    pub fn rotate(&mut self, rotation: Rotation) {
        if rotation == Rotation::None {
            return;
        }
        self.image = rotate3(&self.image, rotation);
        self.temperature = rotate2(&self.temperature, rotation);
    }

    /// Mirror both planes horizontally.
    pub fn flip(&mut self) {
        self.image = standard(self.image.slice(s![.., ..;-1, ..]));
        self.temperature = standard(self.temperature.slice(s![.., ..;-1]));
    }

    pub fn apply(&mut self, transform: Transform) {
        self.rotate(transform.rotation);
        if transform.flip {
            self.flip();
        }
    }
}

fn standard<S, D>(view: ArrayBase<S, D>) -> ndarray::Array<S::Elem, D>
where
    S: Data,
    S::Elem: Clone,
    D: Dimension,
{
    view.as_standard_layout().into_owned()
}

fn rotate2<T: Clone>(a: &Array2<T>, rotation: Rotation) -> Array2<T> {
    match rotation {
        Rotation::None => a.clone(),
        Rotation::Cw90 => standard(a.t().slice(s![.., ..;-1])),
        Rotation::Rotate180 => standard(a.slice(s![..;-1, ..;-1])),
        Rotation::Ccw90 => standard(a.t().slice(s![..;-1, ..])),
    }
}

fn rotate3<T: Clone>(a: &Array3<T>, rotation: Rotation) -> Array3<T> {
    let swapped = || a.view().permuted_axes([1, 0, 2]);
    match rotation {
        Rotation::None => a.clone(),
        Rotation::Cw90 => standard(swapped().slice_move(s![.., ..;-1, ..])),
        Rotation::Rotate180 => standard(a.slice(s![..;-1, ..;-1, ..])),
        Rotation::Ccw90 => standard(swapped().slice_move(s![..;-1, .., ..])),
    }
}

/// Decodes raw frames of a fixed sensor geometry.
///
/// The transform is sticky: it is applied to every frame
/// until replaced.
#[derive(Clone, Debug)]
pub struct ThermalFrameDecoder {
    geometry: SensorGeometry,
    calibration: Calibration,
    transform: Transform,
}

impl ThermalFrameDecoder {
    pub fn new(geometry: SensorGeometry, calibration: Calibration) -> Self {
        ThermalFrameDecoder {
            geometry,
            calibration,
            transform: Transform::default(),
        }
    }

    pub fn geometry(&self) -> SensorGeometry {
        self.geometry
    }

    /// Geometry of decoded planes under the current
    /// transform.
    pub fn output_geometry(&self) -> SensorGeometry {
        self.transform.apply_to(self.geometry)
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// Validate and decode a raw byte buffer.
    pub fn decode_bytes(&self, bytes: Vec<u8>) -> Result<PlaneSet> {
        let frame = RawFrame::new(self.geometry, bytes)?;
        self.decode(&frame)
    }

    /// Split a frame into planes, convert the calibration
    /// plane to Celsius and apply the current transform.
    pub fn decode(&self, frame: &RawFrame) -> Result<PlaneSet> {
        if frame.geometry() != self.geometry {
            return Err(ThermalError::MalformedFrame {
                expected: self.geometry.frame_len(),
                actual: frame.as_bytes().len(),
            });
        }
        let SensorGeometry { width, height } = self.geometry;

        let image = Array3::from_shape_vec(
            (height, width, BYTES_PER_PIXEL),
            frame.image_bytes().to_vec(),
        )
        .map_err(|_| ThermalError::MalformedFrame {
            expected: self.geometry.frame_len(),
            actual: frame.as_bytes().len(),
        })?;

        let temperature = self.temperature_field(frame.calibration_bytes())?;

        let mut planes = PlaneSet { image, temperature };
        planes.apply(self.transform);
        Ok(planes)
    }

    fn temperature_field(&self, calibration: &[u8]) -> Result<Array2<f64>> {
        let SensorGeometry { width, height } = self.geometry;
        let temp_t = self.calibration.raw_transform();

        let mut rdr = ByteOrdered::le(calibration);
        let mut values = Vec::with_capacity(width * height);
        for _ in 0..width * height {
            values.push(temp_t(rdr.read_u16()?));
        }

        Array2::from_shape_vec((height, width), values).map_err(|_| ThermalError::MalformedFrame {
            expected: self.geometry.plane_len(),
            actual: calibration.len(),
        })
    }
}
