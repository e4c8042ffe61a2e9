//! HUD overlay: crosshair, status panel, hot/cold spots.
use std::time::Duration;

use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut},
    rect::Rect,
};

use super::{font, HudStatus};
use crate::{
    session::{HudMode, RenderConfig},
    stats::{FrameStatistics, PixelPos},
};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const LABEL: Rgb<u8> = Rgb([255, 255, 0]);
const HOT: Rgb<u8> = Rgb([255, 0, 0]);
const COLD: Rgb<u8> = Rgb([0, 0, 255]);
const REC_ACTIVE: Rgb<u8> = Rgb([255, 40, 40]);
const REC_IDLE: Rgb<u8> = Rgb([200, 200, 200]);

pub(super) fn draw(
    img: &mut RgbImage,
    stats: &FrameStatistics,
    config: &RenderConfig,
    status: &HudStatus,
    unit: &str,
) {
    let scale = config.scale.max(1);
    let size = (scale + 1) / 2;

    if matches!(config.hud, HudMode::Cross | HudMode::All) {
        crosshair(img, stats.display.target, stats.target, scale, size, unit);
    }
    if config.hud == HudMode::All {
        panel(img, stats, config, status, size, unit);
    }
    if config.hud != HudMode::None {
        if stats.max > stats.average + config.threshold {
            spot(img, stats.display.max, stats.max, HOT, scale, size, unit);
        }
        if stats.min < stats.average - config.threshold {
            spot(img, stats.display.min, stats.min, COLD, scale, size, unit);
        }
    }
}

/// Shortest float text; whole numbers keep one decimal.
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0. {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn crosshair(img: &mut RgbImage, at: PixelPos, value: f64, scale: u32, size: u32, unit: &str) {
    let (x, y) = (at.col as i32, at.row as i32);
    let half = (20 * scale) as i32;
    let span = 2 * half as u32 + 1;

    draw_filled_rect_mut(img, Rect::at(x - 1, y - half).of_size(2, span), WHITE);
    draw_filled_rect_mut(img, Rect::at(x - half, y - 1).of_size(span, 2), WHITE);

    let text = format!("{}{}", format_value(value), unit);
    let (_, h) = font::text_extent(&text, size);
    font::draw_outlined_text(img, x as i64 + 10, y as i64 - 10 - h as i64, &text, size, LABEL);
}

fn panel(
    img: &mut RgbImage,
    stats: &FrameStatistics,
    config: &RenderConfig,
    status: &HudStatus,
    size: u32,
    unit: &str,
) {
    let snapshot = status.snapshot_time.as_deref().unwrap_or("None");
    let lines = [
        format!("Avg Temp: {}{}", format_value(stats.average), unit),
        format!("Min Temp: {}{}", format_value(stats.min), unit),
        format!("Max Temp: {}{}", format_value(stats.max), unit),
        format!("Label Threshold: {}{}", config.threshold, unit),
        format!("Colormap: {}", config.colormap.name()),
        format!("Blur: {}", config.blur),
        format!("Scaling: {}", config.scale),
        format!("Contrast: {}", format_value(config.alpha)),
        format!("Snapshot: {}", snapshot),
        format!("Recording: {}", format_elapsed(status.elapsed)),
    ];

    let margin = 5 * size;
    let line_height = (font::GLYPH_H as u32 + 7) * size;
    let width = lines
        .iter()
        .map(|l| font::text_extent(l, size).0)
        .max()
        .unwrap_or(0)
        + 2 * margin;
    let height = lines.len() as u32 * line_height + margin;
    draw_filled_rect_mut(img, Rect::at(0, 0).of_size(width, height), BLACK);

    let last = lines.len() - 1;
    for (i, line) in lines.iter().enumerate() {
        let color = if i == last {
            if status.recording {
                REC_ACTIVE
            } else {
                REC_IDLE
            }
        } else {
            LABEL
        };
        let y = margin + i as u32 * line_height;
        font::draw_text(img, margin as i64, y as i64, line, size, color);
    }
}

fn spot(
    img: &mut RgbImage,
    at: PixelPos,
    value: f64,
    color: Rgb<u8>,
    scale: u32,
    size: u32,
    unit: &str,
) {
    let center = (at.col as i32, at.row as i32);
    let radius = (5 * scale) as i32;
    draw_filled_circle_mut(img, center, radius, color);
    draw_hollow_circle_mut(img, center, radius + 1, BLACK);

    let text = format!("{}{}", format_value(value), unit);
    let (_, h) = font::text_extent(&text, size);
    font::draw_outlined_text(
        img,
        center.0 as i64 + 10,
        center.1 as i64 + 5 - h as i64,
        &text,
        size,
        LABEL,
    );
}
