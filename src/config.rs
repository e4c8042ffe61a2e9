//! Session settings, loaded from an optional JSON file.
use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use serde_derive::*;

use crate::{
    capture::DeviceSelector,
    decode::Rotation,
    error::{Result, ThermalError},
    frame::SensorGeometry,
    palette::Colormap,
    session::{HudMode, RenderConfig, SessionState, MAX_ALPHA, MAX_SCALE, MIN_SCALE},
    stats::PixelPos,
    temperature::Calibration,
};

/// All fields are optional in the file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub width: usize,
    pub height: usize,
    pub scale: u32,
    pub alpha: f64,
    /// Palette index, 0 to 10.
    pub colormap: usize,
    pub rotation: Rotation,
    pub flip: bool,
    pub hud: HudMode,
    pub fullscreen: bool,
    pub blur: u32,
    pub threshold: f64,
    pub temp_offset: f64,
    pub target_step: usize,
    /// `(row, col)`; defaults to the centre.
    pub target: Option<PixelPos>,
    pub precision: u32,
    pub unit: String,
    pub output_dir: PathBuf,
    pub file_slug: String,
    /// Cap on delivered frames per second; 0 disables it.
    pub stream_fps: f64,
    pub camera: String,
    pub capture_fps: f64,
    pub record_fps: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            width: SensorGeometry::TC001.width,
            height: SensorGeometry::TC001.height,
            scale: 3,
            alpha: 1.,
            colormap: 0,
            rotation: Rotation::None,
            flip: false,
            hud: HudMode::Spots,
            fullscreen: false,
            blur: 0,
            threshold: 2.,
            temp_offset: 0.,
            target_step: 1,
            target: None,
            precision: 2,
            unit: " C".into(),
            output_dir: ".".into(),
            file_slug: "TC001".into(),
            stream_fps: 0.,
            camera: "-1".into(),
            capture_fps: 25.,
            record_fps: 25.,
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file gives the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };
        let settings: Settings = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ThermalError::Config(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ThermalError::Config("sensor size must be positive".into()));
        }
        if Colormap::from_index(self.colormap).is_none() {
            return Err(ThermalError::Config(format!(
                "colormap must be 0 to {}, got {}",
                Colormap::ALL.len() - 1,
                self.colormap
            )));
        }
        if !(self.capture_fps > 0.) {
            return Err(ThermalError::Config("capture_fps must be positive".into()));
        }
        if self.target_step == 0 {
            return Err(ThermalError::Config("target_step must be positive".into()));
        }
        self.device()?;
        Ok(())
    }

    pub fn geometry(&self) -> SensorGeometry {
        SensorGeometry {
            width: self.width,
            height: self.height,
        }
    }

    pub fn device(&self) -> Result<DeviceSelector> {
        self.camera.parse()
    }

    pub fn calibration(&self) -> Calibration {
        Calibration::new(self.temp_offset, self.precision)
    }

    /// Initial display parameters, clamped to their ranges.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            geometry: self.geometry(),
            scale: self.scale.max(MIN_SCALE).min(MAX_SCALE),
            alpha: self.alpha.max(0.).min(MAX_ALPHA),
            blur: self.blur,
            threshold: self.threshold.max(0.),
            colormap: Colormap::from_index(self.colormap).unwrap_or_default(),
            rotation: self.rotation,
            flip: self.flip,
            hud: self.hud,
            fullscreen: self.fullscreen,
        }
    }

    pub fn session(&self) -> SessionState {
        SessionState::new(self.render_config(), self.target, self.target_step, self.temp_offset)
    }
}
