//! Turn the image plane into the false-colour display
//! frame.
//!
//! Stages run in a fixed order: YUYV to RGB, contrast,
//! bicubic upscale, box blur, palette, HUD. Changing the
//! order changes the output.
use std::time::Duration;

use image::{imageops, GrayImage, Rgb, RgbImage};
use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::{
    error::{Result, ThermalError},
    frame::SensorGeometry,
    session::RenderConfig,
    stats::FrameStatistics,
};

pub mod font;
mod hud;

/// Recording/snapshot information shown in the status
/// panel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HudStatus {
    pub snapshot_time: Option<String>,
    pub recording: bool,
    pub elapsed: Duration,
}

/// Stateless renderer; safe to call once per frame.
#[derive(Clone, Debug)]
pub struct HeatmapRenderer {
    unit: String,
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        HeatmapRenderer::new(" C")
    }
}

impl HeatmapRenderer {
    pub fn new(unit: &str) -> Self {
        HeatmapRenderer {
            unit: unit.to_string(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Render the colour-mapped frame without any overlay.
    pub fn render_heatmap(&self, image: ArrayView3<u8>, config: &RenderConfig) -> Result<RgbImage> {
        let expected = config.plane_geometry();
        let (height, width, _) = image.dim();
        if (width, height) != (expected.width, expected.height) {
            return Err(ThermalError::DimensionMismatch {
                expected_width: expected.width,
                expected_height: expected.height,
                actual_width: width,
                actual_height: height,
            });
        }

        let rgb = yuyv_to_rgb(image);
        let rgb = convert_scale_abs(rgb, config.alpha);

        let display = config.display_geometry();
        let rgb = imageops::resize(
            &rgb,
            display.width as u32,
            display.height as u32,
            imageops::FilterType::CatmullRom,
        );
        let rgb = box_blur(&rgb, config.blur);

        let mut heatmap = config.colormap.map(&to_gray(&rgb));
        if config.colormap.swaps_red_blue() {
            swap_red_blue(&mut heatmap);
        }
        Ok(heatmap)
    }

    /// Render the display frame including the HUD.
    pub fn render(
        &self,
        image: ArrayView3<u8>,
        stats: &FrameStatistics,
        config: &RenderConfig,
        status: &HudStatus,
    ) -> Result<RgbImage> {
        let mut heatmap = self.render_heatmap(image, config)?;
        hud::draw(&mut heatmap, stats, config, status, &self.unit);
        Ok(heatmap)
    }
}

/// BT.601 YUYV to RGB with the fixed-point coefficients of
/// the usual camera pipelines. Each pixel pair shares the U
/// byte of the even pixel and the V byte of the odd pixel.
pub fn yuyv_to_rgb(image: ArrayView3<u8>) -> RgbImage {
    const SHIFT: i32 = 20;
    const HALF: i32 = 1 << (SHIFT - 1);
    const CY: i32 = 1220542;
    const CUB: i32 = 2116026;
    const CUG: i32 = -409993;
    const CVG: i32 = -852492;
    const CVR: i32 = 1673527;

    let (height, width, _) = image.dim();
    let mut out = RgbImage::new(width as u32, height as u32);
    let clip = |v: i32| (v >> SHIFT).max(0).min(255) as u8;

    for row in 0..height {
        let mut col = 0;
        while col < width {
            let u = image[(row, col, 1)] as i32 - 128;
            let v = if col + 1 < width {
                image[(row, col + 1, 1)] as i32 - 128
            } else {
                0
            };
            let ruv = HALF + CVR * v;
            let guv = HALF + CVG * v + CUG * u;
            let buv = HALF + CUB * u;
            for c in col..(col + 2).min(width) {
                let y = (image[(row, c, 0)] as i32 - 16).max(0) * CY;
                out.put_pixel(
                    c as u32,
                    row as u32,
                    Rgb([clip(y + ruv), clip(y + guv), clip(y + buv)]),
                );
            }
            col += 2;
        }
    }
    out
}

/// `saturate(|v * alpha|)` on every channel, rounding
/// halves to even.
pub fn convert_scale_abs(mut img: RgbImage, alpha: f64) -> RgbImage {
    img.par_iter_mut()
        .for_each(|v| *v = (*v as f64 * alpha).abs().round_ties_even().min(255.) as u8);
    img
}

#[inline]
fn reflect101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= len {
        i = if i < 0 { -i } else { 2 * (len - 1) - i };
    }
    i as usize
}

/// Normalized `ksize x ksize` box filter with reflect-101
/// borders. `ksize <= 1` is the identity.
pub fn box_blur(img: &RgbImage, ksize: u32) -> RgbImage {
    if ksize <= 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let (w, h) = (w as i64, h as i64);
    let k = ksize as i64;
    let before = k / 2;
    let area = (k * k) as u32;
    let src = img.as_raw();

    // horizontal sums, then vertical sums of those
    let mut horiz = vec![0u32; (w * h * 3) as usize];
    horiz
        .par_chunks_mut((w * 3) as usize)
        .enumerate()
        .for_each(|(y, line)| {
            for x in 0..w {
                let mut acc = [0u32; 3];
                for dx in 0..k {
                    let sx = reflect101(x + dx - before, w);
                    let base = (y * w as usize + sx) * 3;
                    for c in 0..3 {
                        acc[c] += src[base + c] as u32;
                    }
                }
                line[(x * 3) as usize..(x * 3 + 3) as usize].copy_from_slice(&acc);
            }
        });

    let mut out = RgbImage::new(w as u32, h as u32);
    out.par_chunks_mut((w * 3) as usize)
        .enumerate()
        .for_each(|(y, line)| {
            for x in 0..w as usize {
                let mut acc = [0u32; 3];
                for dy in 0..k {
                    let sy = reflect101(y as i64 + dy - before, h);
                    let base = (sy * w as usize + x) * 3;
                    for c in 0..3 {
                        acc[c] += horiz[base + c];
                    }
                }
                for c in 0..3 {
                    line[x * 3 + c] = ((acc[c] + area / 2) / area) as u8;
                }
            }
        });
    out
}

/// Luma with the fixed-point BT.601 weights (R 4899, G 9617,
/// B 1868, 14-bit shift).
pub fn to_gray(img: &RgbImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    out.par_iter_mut()
        .zip(img.as_raw().par_chunks(3))
        .for_each(|(g, px)| {
            let v = px[0] as u32 * 4899 + px[1] as u32 * 9617 + px[2] as u32 * 1868;
            *g = ((v + (1 << 13)) >> 14) as u8;
        });
    out
}

pub fn swap_red_blue(img: &mut RgbImage) {
    img.par_chunks_mut(3).for_each(|px| px.swap(0, 2));
}

/// Display size of a plane under an integer scale.
pub fn display_size(plane: SensorGeometry, scale: u32) -> SensorGeometry {
    SensorGeometry {
        width: plane.width * scale as usize,
        height: plane.height * scale as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decode::Rotation,
        palette::Colormap,
        session::HudMode,
        stats::{DisplayPositions, PixelPos},
    };
    use ndarray::Array3;

    fn neutral_plane(height: usize, width: usize, y: u8) -> Array3<u8> {
        let mut plane = Array3::zeros((height, width, 2));
        for row in 0..height {
            for col in 0..width {
                plane[(row, col, 0)] = y;
                plane[(row, col, 1)] = 128;
            }
        }
        plane
    }

    fn config(geometry: SensorGeometry) -> RenderConfig {
        RenderConfig {
            geometry,
            scale: 2,
            hud: HudMode::None,
            ..RenderConfig::default()
        }
    }

    fn flat_stats() -> FrameStatistics {
        FrameStatistics {
            max: 20.,
            min: 20.,
            average: 20.,
            target: 20.,
            max_pos: PixelPos::default(),
            min_pos: PixelPos::default(),
            target_pos: PixelPos::default(),
            display: DisplayPositions::default(),
        }
    }

    #[test]
    fn neutral_chroma_is_gray() {
        let plane = neutral_plane(2, 4, 126);
        let rgb = yuyv_to_rgb(plane.view());
        let px = rgb.get_pixel(1, 1).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
        // (126 - 16) * 255 / 219
        assert_eq!(px[0], 128);
    }

    #[test]
    fn video_range_is_clipped() {
        let rgb = yuyv_to_rgb(neutral_plane(1, 2, 250).view());
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        let rgb = yuyv_to_rgb(neutral_plane(1, 2, 5).view());
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn contrast_scales_and_saturates() {
        let img = RgbImage::from_raw(2, 1, vec![10, 100, 200, 0, 1, 255]).unwrap();
        let out = convert_scale_abs(img, 1.5);
        assert_eq!(out.as_raw(), &vec![15, 150, 255, 0, 2, 255]);
    }

    #[test]
    fn contrast_rounds_halves_to_even() {
        let img = RgbImage::from_raw(2, 1, vec![1, 3, 5, 7, 9, 169]).unwrap();
        let out = convert_scale_abs(img, 1.5);
        assert_eq!(out.as_raw(), &vec![2, 4, 8, 10, 14, 254]);
    }

    #[test]
    fn blur_of_constant_is_constant() {
        let img = RgbImage::from_pixel(7, 5, Rgb([40, 80, 120]));
        assert_eq!(box_blur(&img, 3), img);
        assert_eq!(box_blur(&img, 0), img);
    }

    #[test]
    fn blur_averages_neighbourhood() {
        let mut img = RgbImage::new(3, 3);
        img.put_pixel(1, 1, Rgb([90, 9, 0]));
        let out = box_blur(&img, 3);
        assert_eq!(out.get_pixel(1, 1).0, [10, 1, 0]);
    }

    #[test]
    fn gray_weights() {
        let img = RgbImage::from_raw(3, 1, vec![255, 0, 0, 0, 255, 0, 255, 255, 255]).unwrap();
        let gray = to_gray(&img);
        assert_eq!(gray.as_raw(), &vec![76, 150, 255]);
    }

    #[test]
    fn output_is_display_sized() {
        let geom = SensorGeometry {
            width: 8,
            height: 6,
        };
        let plane = neutral_plane(6, 8, 120);
        let cfg = config(geom);
        let out = HeatmapRenderer::default()
            .render(plane.view(), &flat_stats(), &cfg, &HudStatus::default())
            .unwrap();
        assert_eq!(out.dimensions(), (16, 12));
    }

    #[test]
    fn rotated_config_rejects_unrotated_plane() {
        let geom = SensorGeometry {
            width: 8,
            height: 6,
        };
        let plane = neutral_plane(6, 8, 120);
        let cfg = RenderConfig {
            rotation: Rotation::Cw90,
            ..config(geom)
        };
        let err = HeatmapRenderer::default()
            .render_heatmap(plane.view(), &cfg)
            .unwrap_err();
        assert!(matches!(err, ThermalError::DimensionMismatch { expected_width: 6, .. }));
    }

    #[test]
    fn inverse_rainbow_swaps_red_and_blue() {
        let geom = SensorGeometry {
            width: 4,
            height: 4,
        };
        let mut plane = neutral_plane(4, 4, 40);
        plane[(0, 0, 0)] = 200;
        let cfg = RenderConfig {
            colormap: Colormap::InvRainbow,
            scale: 1,
            ..config(geom)
        };
        let renderer = HeatmapRenderer::default();
        let out = renderer.render_heatmap(plane.view(), &cfg).unwrap();

        let rgb = convert_scale_abs(yuyv_to_rgb(plane.view()), cfg.alpha);
        let rgb = imageops::resize(&rgb, 4, 4, imageops::FilterType::CatmullRom);
        let raw = Colormap::InvRainbow.map(&to_gray(&rgb));

        for (swapped, plain) in out.pixels().zip(raw.pixels()) {
            assert_eq!(swapped.0, [plain.0[2], plain.0[1], plain.0[0]]);
        }
        assert_ne!(out, raw);
    }
}
