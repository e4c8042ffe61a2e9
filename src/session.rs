//! Display configuration and the command surface shared
//! between the frame loop and the control thread.
//!
//! Every field has its own lock or atomic; a reader may see
//! one field updated a frame before another, which only
//! shows as a single-frame glitch.
use std::{
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde_derive::*;
use tracing::{debug, info};

use crate::{
    decode::{Rotation, Transform},
    error::{Result, ThermalError},
    frame::SensorGeometry,
    palette::Colormap,
    render::{display_size, HudStatus},
    stats::{FrameStatistics, PixelPos},
    temperature::round_to,
};

pub const MIN_SCALE: u32 = 1;
pub const MAX_SCALE: u32 = 5;
pub const MAX_ALPHA: f64 = 3.;

/// Which overlays are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HudMode {
    Spots,
    All,
    Cross,
    None,
}

impl HudMode {
    pub const ALL: [HudMode; 4] = [HudMode::Spots, HudMode::All, HudMode::Cross, HudMode::None];

    pub fn name(self) -> &'static str {
        match self {
            HudMode::Spots => "spots",
            HudMode::All => "all",
            HudMode::Cross => "cross",
            HudMode::None => "none",
        }
    }
}

impl Default for HudMode {
    fn default() -> Self {
        HudMode::Spots
    }
}

/// One consistent read of the display parameters, taken at
/// the start of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Sensor geometry before rotation.
    pub geometry: SensorGeometry,
    pub scale: u32,
    pub alpha: f64,
    pub blur: u32,
    pub threshold: f64,
    pub colormap: Colormap,
    pub rotation: Rotation,
    pub flip: bool,
    pub hud: HudMode,
    pub fullscreen: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            geometry: SensorGeometry::TC001,
            scale: 1,
            alpha: 1.,
            blur: 0,
            threshold: 2.,
            colormap: Colormap::default(),
            rotation: Rotation::default(),
            flip: false,
            hud: HudMode::default(),
            fullscreen: false,
        }
    }
}

impl RenderConfig {
    pub fn transform(&self) -> Transform {
        Transform {
            rotation: self.rotation,
            flip: self.flip,
        }
    }

    /// Geometry of the decoded planes under the current
    /// rotation.
    pub fn plane_geometry(&self) -> SensorGeometry {
        self.transform().apply_to(self.geometry)
    }

    pub fn display_geometry(&self) -> SensorGeometry {
        display_size(self.plane_geometry(), self.scale)
    }
}

/// A fixed ordered option list with a current index.
/// Advancing wraps around.
#[derive(Clone, Copy, Debug)]
pub struct Cycle<T: 'static> {
    options: &'static [T],
    index: usize,
}

impl<T: Copy + PartialEq + 'static> Cycle<T> {
    /// Start at `current`, or at the first option if it is
    /// not in the list.
    pub fn new(options: &'static [T], current: T) -> Self {
        let index = options.iter().position(|o| *o == current).unwrap_or(0);
        Cycle { options, index }
    }

    pub fn current(&self) -> T {
        self.options[self.index]
    }

    pub fn advance(&mut self) -> T {
        self.index = (self.index + 1) % self.options.len();
        self.current()
    }
}

const TOGGLE: [bool; 2] = [false, true];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Aggregate a reference temperature is matched against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    Min,
    Max,
    Average,
}

/// Control commands, as sent by a control surface.
///
/// ```
/// # use topdon::session::Command;
/// let cmd: Command = serde_json::from_str(r#"{"command":"move","direction":"left"}"#).unwrap();
/// assert_eq!(cmd, Command::Move { direction: topdon::session::Direction::Left });
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CycleColormap,
    CycleRotation,
    CycleFlip,
    CycleHud,
    ToggleFullscreen,
    ToggleRecording,
    Snapshot,
    Move { direction: Direction },
    /// Normalized `(0..1, 0..1)` position, `x` along columns.
    SetTarget { x: f64, y: f64 },
    Blur { delta: i32 },
    Threshold { delta: i32 },
    Scale { delta: i32 },
    /// Contrast in steps of 0.1.
    Contrast { delta: i32 },
    SetReference { destination: Reference, temperature: f64 },
    Stop,
}

/// Shared session state.
///
/// The control thread mutates fields through [`apply`];
/// the frame loop reads [`render_config`] and the request
/// flags once per frame.
///
/// [`apply`]: SessionState::apply
/// [`render_config`]: SessionState::render_config
#[derive(Debug)]
pub struct SessionState {
    geometry: SensorGeometry,
    target_step: usize,

    colormap: Mutex<Cycle<Colormap>>,
    rotation: Mutex<Cycle<Rotation>>,
    flip: Mutex<Cycle<bool>>,
    hud: Mutex<Cycle<HudMode>>,
    fullscreen: Mutex<Cycle<bool>>,

    scale: AtomicU32,
    blur: AtomicU32,
    alpha: Mutex<f64>,
    threshold: Mutex<f64>,
    temp_offset: Mutex<f64>,
    target: Mutex<PixelPos>,

    recording_requested: AtomicBool,
    recording: AtomicBool,
    snapshot_requested: AtomicBool,
    stop: AtomicBool,

    snapshot_time: Mutex<Option<String>>,
    elapsed: Mutex<Duration>,
    last_stats: Mutex<Option<FrameStatistics>>,
}

impl SessionState {
    pub fn new(
        config: RenderConfig,
        target: Option<PixelPos>,
        target_step: usize,
        temp_offset: f64,
    ) -> Self {
        let plane = config.plane_geometry();
        let target = target
            .unwrap_or_else(|| PixelPos::new(plane.height / 2, plane.width / 2))
            .clamped(plane);
        SessionState {
            geometry: config.geometry,
            target_step,
            colormap: Mutex::new(Cycle::new(&Colormap::ALL, config.colormap)),
            rotation: Mutex::new(Cycle::new(&Rotation::ALL, config.rotation)),
            flip: Mutex::new(Cycle::new(&TOGGLE, config.flip)),
            hud: Mutex::new(Cycle::new(&HudMode::ALL, config.hud)),
            fullscreen: Mutex::new(Cycle::new(&TOGGLE, config.fullscreen)),
            scale: AtomicU32::new(config.scale.max(MIN_SCALE).min(MAX_SCALE)),
            blur: AtomicU32::new(config.blur),
            alpha: Mutex::new(config.alpha.max(0.).min(MAX_ALPHA)),
            threshold: Mutex::new(config.threshold.max(0.)),
            temp_offset: Mutex::new(temp_offset),
            target: Mutex::new(target),
            recording_requested: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            snapshot_requested: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            snapshot_time: Mutex::new(None),
            elapsed: Mutex::new(Duration::default()),
            last_stats: Mutex::new(None),
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            geometry: self.geometry,
            scale: self.scale.load(Ordering::SeqCst),
            alpha: *self.alpha.lock(),
            blur: self.blur.load(Ordering::SeqCst),
            threshold: *self.threshold.lock(),
            colormap: self.colormap.lock().current(),
            rotation: self.rotation.lock().current(),
            flip: self.flip.lock().current(),
            hud: self.hud.lock().current(),
            fullscreen: self.fullscreen.lock().current(),
        }
    }

    fn plane_geometry(&self) -> SensorGeometry {
        Transform {
            rotation: self.rotation.lock().current(),
            flip: false,
        }
        .apply_to(self.geometry)
    }

    /// Target pixel in the current (rotated) plane.
    pub fn target(&self) -> PixelPos {
        *self.target.lock()
    }

    pub fn temp_offset(&self) -> f64 {
        *self.temp_offset.lock()
    }

    pub fn apply(&self, command: Command) -> Result<()> {
        debug!("command {:?}", command);
        match command {
            Command::CycleColormap => {
                let c = self.colormap.lock().advance();
                info!("colormap {}", c.name());
            }
            Command::CycleRotation => {
                let r = self.rotation.lock().advance();
                let plane = self.plane_geometry();
                let mut target = self.target.lock();
                *target = target.clamped(plane);
                info!("rotation {}", r.label());
            }
            Command::CycleFlip => {
                self.flip.lock().advance();
            }
            Command::CycleHud => {
                let h = self.hud.lock().advance();
                info!("hud {}", h.name());
            }
            Command::ToggleFullscreen => {
                self.fullscreen.lock().advance();
            }
            Command::ToggleRecording => {
                self.recording_requested.fetch_xor(true, Ordering::SeqCst);
            }
            Command::Snapshot => self.snapshot_requested.store(true, Ordering::SeqCst),
            Command::Move { direction } => self.move_target(direction),
            Command::SetTarget { x, y } => self.set_target(x, y),
            Command::Blur { delta } => step_u32(&self.blur, delta, 0, u32::MAX),
            Command::Scale { delta } => step_u32(&self.scale, delta, MIN_SCALE, MAX_SCALE),
            Command::Threshold { delta } => {
                let mut t = self.threshold.lock();
                *t = (*t + delta as f64).max(0.);
            }
            Command::Contrast { delta } => {
                let mut a = self.alpha.lock();
                *a = round_to(*a + 0.1 * delta as f64, 1).max(0.).min(MAX_ALPHA);
            }
            Command::SetReference {
                destination,
                temperature,
            } => self.set_reference(destination, temperature)?,
            Command::Stop => self.request_stop(),
        }
        Ok(())
    }

    fn move_target(&self, direction: Direction) {
        let plane = self.plane_geometry();
        let step = self.target_step;
        let mut t = self.target.lock();
        let moved = match direction {
            Direction::Up => PixelPos::new(t.row.saturating_sub(step), t.col),
            Direction::Down => PixelPos::new(t.row + step, t.col),
            Direction::Left => PixelPos::new(t.row, t.col.saturating_sub(step)),
            Direction::Right => PixelPos::new(t.row, t.col + step),
        };
        *t = moved.clamped(plane);
    }

    fn set_target(&self, x: f64, y: f64) {
        let plane = self.plane_geometry();
        let along = |v: f64, len: usize| (v.max(0.).min(1.) * len as f64) as usize;
        let pos = PixelPos::new(along(y, plane.height), along(x, plane.width));
        *self.target.lock() = pos.clamped(plane);
    }

    fn set_reference(&self, destination: Reference, temperature: f64) -> Result<()> {
        let stats = self.last_stats().ok_or(ThermalError::NoStatistics)?;
        let current = match destination {
            Reference::Min => stats.min,
            Reference::Max => stats.max,
            Reference::Average => stats.average,
        };
        let mut offset = self.temp_offset.lock();
        *offset += temperature - current;
        info!("temperature offset now {}", *offset);
        Ok(())
    }

    pub fn recording_requested(&self) -> bool {
        self.recording_requested.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Report the actual recording state. A stop caused by a
    /// write failure also clears the request.
    pub fn set_recording(&self, recording: bool) {
        self.recording.store(recording, Ordering::SeqCst);
        if !recording {
            self.recording_requested.store(false, Ordering::SeqCst);
            *self.elapsed.lock() = Duration::default();
        }
    }

    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.elapsed.lock() = elapsed;
    }

    /// Consume a pending snapshot request.
    pub fn take_snapshot_request(&self) -> bool {
        self.snapshot_requested.swap(false, Ordering::SeqCst)
    }

    pub fn set_snapshot_time(&self, time: String) {
        *self.snapshot_time.lock() = Some(time);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn set_last_stats(&self, stats: FrameStatistics) {
        *self.last_stats.lock() = Some(stats);
    }

    pub fn last_stats(&self) -> Option<FrameStatistics> {
        *self.last_stats.lock()
    }

    pub fn hud_status(&self) -> HudStatus {
        HudStatus {
            snapshot_time: self.snapshot_time.lock().clone(),
            recording: self.is_recording(),
            elapsed: *self.elapsed.lock(),
        }
    }
}

fn step_u32(value: &AtomicU32, delta: i32, min: u32, max: u32) {
    let current = value.load(Ordering::SeqCst) as i64;
    let next = (current + delta as i64).max(min as i64).min(max as i64);
    value.store(next as u32, Ordering::SeqCst);
}
