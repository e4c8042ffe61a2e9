use std::{env, io::Cursor, path::Path, sync::Arc};

use image::{imageops, RgbImage};
use topdon::{
    capture::{CaptureHandle, FrameReader},
    config::Settings,
    frame::SensorGeometry,
    palette::Colormap,
    pipeline::FrameLoop,
    render::{box_blur, convert_scale_abs, to_gray, yuyv_to_rgb, HudStatus},
    session::{Command, HudMode, RenderConfig},
    stats::PixelPos,
    HeatmapRenderer, ThermalFrameDecoder,
};

const HOT: PixelPos = PixelPos { row: 9, col: 21 };
const COLD: PixelPos = PixelPos { row: 2, col: 4 };

fn geometry() -> SensorGeometry {
    SensorGeometry {
        width: 32,
        height: 24,
    }
}

/// A frame at 14.85 C with one 46.85 C and one -17.15 C
/// pixel, over a diagonal luminance ramp.
fn frame(seed: usize) -> Vec<u8> {
    let SensorGeometry { width, height } = geometry();
    let mut data = Vec::with_capacity(geometry().frame_len());
    for row in 0..height {
        for col in 0..width {
            data.push(((row * 9 + col * 5 + seed) % 200 + 20) as u8);
            data.push(if col % 2 == 0 { 100 } else { 160 });
        }
    }
    for row in 0..height {
        for col in 0..width {
            let high = match PixelPos::new(row, col) {
                HOT => 0x50,
                COLD => 0x40,
                _ => 0x48,
            };
            data.push(0);
            data.push(high);
        }
    }
    data
}

fn settings(dir: &Path) -> Settings {
    Settings {
        width: geometry().width,
        height: geometry().height,
        scale: 2,
        hud: HudMode::None,
        colormap: 0,
        output_dir: dir.to_owned(),
        ..Settings::default()
    }
}

fn capture(frames: usize) -> CaptureHandle {
    let mut bytes = vec![];
    for i in 0..frames {
        bytes.extend(frame(i));
    }
    let reader = FrameReader::new(Cursor::new(bytes), geometry(), 25.);
    CaptureHandle::new("synthetic", Box::new(reader))
}

#[test]
fn known_extremes_are_located() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let session = Arc::new(settings.session());
    let mut frames = FrameLoop::new(&settings, session.clone());
    let mut capture = capture(10);

    let mut seen = vec![];
    let n = frames
        .run(&mut capture, |out| {
            seen.push(out.stats);
            assert_eq!(out.image.dimensions(), (64, 48));
            Ok(())
        })
        .unwrap();

    assert_eq!(n, 10);
    assert!(capture.is_released());
    for stats in seen {
        assert_eq!(stats.max, 46.85);
        assert_eq!(stats.max_pos, HOT);
        assert_eq!(stats.display.max, PixelPos::new(18, 42));
        assert_eq!(stats.min, -17.15);
        assert_eq!(stats.min_pos, COLD);
        assert_eq!(stats.display.min, PixelPos::new(4, 8));
        assert_eq!(stats.target_pos, PixelPos::new(12, 16));
        assert_eq!(stats.target, 14.85);
    }
    assert_eq!(session.last_stats().unwrap().max, 46.85);
}

/// Ten 16x12 frames whose luminance ramp and chroma drift
/// with the frame index.
fn drifting_capture() -> CaptureHandle {
    let geometry = SensorGeometry {
        width: 16,
        height: 12,
    };
    let mut bytes = Vec::with_capacity(geometry.frame_len() * 10);
    for i in 0..10 {
        for row in 0..geometry.height {
            for col in 0..geometry.width {
                bytes.push(((row * 9 + col * 5 + 7 * i) % 200 + 20) as u8);
                bytes.push(if col % 2 == 0 { 100 + 3 * i } else { 160 - 2 * i } as u8);
            }
        }
        for _ in 0..geometry.plane_len() {
            bytes.extend([0u8, 0x48]);
        }
    }
    let reader = FrameReader::new(Cursor::new(bytes), geometry, 25.);
    CaptureHandle::new("drifting", Box::new(reader))
}

/// Every frame is rendered under the next palette, so the
/// stacked output covers all palettes but Jet.
#[test]
fn heatmap_matches_reference_image() {
    let reference = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/heatmap.png");
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        width: 16,
        height: 12,
        scale: 1,
        alpha: 1.5,
        blur: 3,
        colormap: 1,
        hud: HudMode::None,
        output_dir: dir.path().to_owned(),
        ..Settings::default()
    };
    let session = Arc::new(settings.session());
    let mut frames = FrameLoop::new(&settings, session.clone());
    let mut capture = drifting_capture();

    let mut rendered = vec![];
    let n = frames
        .run(&mut capture, |out| {
            rendered.push(out.image.clone());
            session.apply(Command::CycleColormap)
        })
        .unwrap();
    assert_eq!(n, 10);

    let mut stacked = RgbImage::new(16, 12 * 10);
    for (i, frame) in rendered.iter().enumerate() {
        imageops::replace(&mut stacked, frame, 0, 12 * i as i64);
    }

    if env::var_os("TOPDON_BLESS").is_some() {
        stacked.save(&reference).unwrap();
        return;
    }
    assert!(
        reference.exists(),
        "missing {}; run with TOPDON_BLESS=1 to create it",
        reference.display()
    );
    let expected = image::open(&reference).unwrap().to_rgb8();
    assert_eq!(stacked.dimensions(), expected.dimensions());
    for (i, (got, want)) in stacked.rows().zip(expected.rows()).enumerate() {
        let got: Vec<_> = got.collect();
        let want: Vec<_> = want.collect();
        assert_eq!(got, want, "row {} of frame {} differs", i % 12, i / 12);
    }
}

#[test]
fn uniform_frame_maps_to_one_colour() {
    let geometry = geometry();
    let mut bytes = vec![];
    for _ in 0..geometry.plane_len() / 2 {
        bytes.extend([90u8, 128]);
    }
    for _ in 0..geometry.plane_len() / 2 {
        bytes.extend([0u8, 0x48]);
    }

    let config = RenderConfig {
        geometry,
        scale: 2,
        blur: 2,
        alpha: 1.2,
        colormap: Colormap::Jet,
        hud: HudMode::None,
        ..RenderConfig::default()
    };
    let decoder = ThermalFrameDecoder::new(geometry, Default::default());
    let planes = decoder.decode_bytes(bytes).unwrap();
    let image = HeatmapRenderer::default()
        .render_heatmap(planes.image.view(), &config)
        .unwrap();

    let rgb = convert_scale_abs(yuyv_to_rgb(planes.image.view()), config.alpha);
    let expected = *Colormap::Jet.map(&to_gray(&box_blur(&rgb, config.blur))).get_pixel(0, 0);
    assert_eq!(image.dimensions(), (64, 48));
    assert!(image.pixels().all(|p| *p == expected));
}

#[test]
fn crosshair_marks_the_target() {
    let config = RenderConfig {
        geometry: geometry(),
        hud: HudMode::Cross,
        ..RenderConfig::default()
    };
    let decoder = ThermalFrameDecoder::new(geometry(), Default::default());
    let planes = decoder.decode_bytes(frame(3)).unwrap();
    let stats = topdon::TemperatureStatistics::default().compute(
        planes.temperature.view(),
        PixelPos::new(12, 16),
        config.display_geometry(),
    );

    let renderer = HeatmapRenderer::default();
    let plain = renderer.render_heatmap(planes.image.view(), &config).unwrap();
    let annotated = renderer
        .render(planes.image.view(), &stats, &config, &HudStatus::default())
        .unwrap();
    assert_eq!(plain.dimensions(), annotated.dimensions());
    assert_eq!(annotated.get_pixel(15, 20).0, [255, 255, 255]);
    assert_eq!(plain.get_pixel(0, 23), annotated.get_pixel(0, 23));
}
