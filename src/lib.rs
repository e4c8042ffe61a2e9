//! Library to decode, measure and display frames from
//! Topdon TC001 / InfiRay P2 Pro thermal cameras.
//!
//! The camera delivers one tall YUYV frame per capture: the
//! top half is a viewable image, the bottom half carries a
//! 16-bit temperature reading per pixel. This crate provides:
//!
//! 1. [Decoding](decode::ThermalFrameDecoder) a raw frame
//! into the image plane and a Celsius [temperature] field,
//! with rotation and mirroring applied to both in lockstep.
//!
//! 2. Per-frame [statistics](stats::TemperatureStatistics):
//! min, max, average and a user-selected target pixel, with
//! locations mapped onto the display resolution.
//!
//! 3. A [renderer](render::HeatmapRenderer) producing the
//! false-colour display frame with an optional HUD.
//!
//! 4. The [session](session::SessionState) shared with a
//! control surface, and the [frame loop](pipeline::FrameLoop)
//! that records, snapshots and hands frames to a sink.
//!
//! # Usage
//!
//! ```rust
//! # fn test_compile() -> topdon::error::Result<()> {
//! use std::sync::Arc;
//! use topdon::{capture, config::Settings, pipeline::FrameLoop};
//!
//! let settings = Settings::default();
//! let session = Arc::new(settings.session());
//! let device = settings.device()?;
//! let mut capture = capture::open(&device, settings.geometry(), settings.capture_fps)?;
//! let mut frames = FrameLoop::new(&settings, session.clone());
//! frames.run(&mut capture, |out| {
//!     println!("max {} at {:?}", out.stats.max, out.stats.max_pos);
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! Temperatures are computed as `(low + high * 256) / 64 -
//! 273.15`, plus a configurable offset, rounded to two
//! decimals.

pub mod capture;
pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod logger;
pub mod palette;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod session;
pub mod stats;
pub mod stream;
pub mod temperature;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::decode::ThermalFrameDecoder;
pub use crate::error::{Result, ThermalError};
pub use crate::render::HeatmapRenderer;
pub use crate::session::SessionState;
pub use crate::stats::TemperatureStatistics;
