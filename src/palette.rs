//! The eleven false-colour palettes.
//!
//! Each palette is a piecewise-linear gradient through a few
//! colour stops, expanded once into a 256-entry lookup
//! table. Index 10 ("Inv Rainbow") is the rainbow table with
//! red and blue exchanged after mapping; the exchange is
//! done by the renderer so that [`Colormap::lut`] always
//! returns the plain table.
use image::{GrayImage, RgbImage};
use lazy_static::lazy_static;
use rayon::prelude::*;
use serde_derive::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    Jet,
    Hot,
    Magma,
    Inferno,
    Plasma,
    Bone,
    Spring,
    Autumn,
    Viridis,
    Parula,
    InvRainbow,
}

pub type Lut = [[u8; 3]; 256];

// (position, 0xRRGGBB)
type Stops = &'static [(f32, u32)];

const JET: Stops = &[
    (0.000, 0x00007F),
    (0.125, 0x0000FF),
    (0.250, 0x007FFF),
    (0.375, 0x00FFFF),
    (0.500, 0x7FFF7F),
    (0.625, 0xFFFF00),
    (0.750, 0xFF7F00),
    (0.875, 0xFF0000),
    (1.000, 0x7F0000),
];
const HOT: Stops = &[
    (0.000, 0x0B0000),
    (0.365, 0xFF0000),
    (0.746, 0xFFFF00),
    (1.000, 0xFFFFFF),
];
const MAGMA: Stops = &[
    (0.000, 0x000004),
    (0.125, 0x1C1044),
    (0.250, 0x4F127B),
    (0.375, 0x812581),
    (0.500, 0xB5367A),
    (0.625, 0xE55064),
    (0.750, 0xFB8761),
    (0.875, 0xFEC287),
    (1.000, 0xFCFDBF),
];
const INFERNO: Stops = &[
    (0.000, 0x000004),
    (0.125, 0x1F0C48),
    (0.250, 0x550F6D),
    (0.375, 0x88226A),
    (0.500, 0xBA3655),
    (0.625, 0xE35933),
    (0.750, 0xF98C0A),
    (0.875, 0xF9C932),
    (1.000, 0xFCFFA4),
];
const PLASMA: Stops = &[
    (0.000, 0x0D0887),
    (0.125, 0x4C02A1),
    (0.250, 0x7E03A8),
    (0.375, 0xA92395),
    (0.500, 0xCC4778),
    (0.625, 0xE56B5D),
    (0.750, 0xF89441),
    (0.875, 0xFDC328),
    (1.000, 0xF0F921),
];
const BONE: Stops = &[
    (0.000, 0x000000),
    (0.365, 0x515171),
    (0.746, 0xA6C6C6),
    (1.000, 0xFFFFFF),
];
const SPRING: Stops = &[(0.0, 0xFF00FF), (1.0, 0xFFFF00)];
const AUTUMN: Stops = &[(0.0, 0xFF0000), (1.0, 0xFFFF00)];
const VIRIDIS: Stops = &[
    (0.000, 0x440154),
    (0.125, 0x482878),
    (0.250, 0x3E4A89),
    (0.375, 0x31688E),
    (0.500, 0x26828E),
    (0.625, 0x1F9E89),
    (0.750, 0x35B779),
    (0.875, 0x6DCD59),
    (1.000, 0xFDE725),
];
const PARULA: Stops = &[
    (0.000, 0x352A87),
    (0.125, 0x0363E1),
    (0.250, 0x1485D4),
    (0.375, 0x06A7C6),
    (0.500, 0x38B99E),
    (0.625, 0x92BF73),
    (0.750, 0xD9BA56),
    (0.875, 0xFCCE2E),
    (1.000, 0xF9FB0E),
];
const RAINBOW: Stops = &[
    (0.0, 0xFF0000),
    (0.2, 0xFFFF00),
    (0.4, 0x00FF00),
    (0.6, 0x00FFFF),
    (0.8, 0x0000FF),
    (1.0, 0x8000FF),
];

lazy_static! {
    static ref LUTS: Vec<Lut> = Colormap::ALL.iter().map(|c| build_lut(c.stops())).collect();
}

fn channel(hex: u32, shift: u32) -> f32 {
    ((hex >> shift) & 0xFF) as f32
}

fn build_lut(stops: Stops) -> Lut {
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let x = i as f32 / 255.;
        let upper = stops
            .iter()
            .position(|&(pos, _)| pos >= x)
            .unwrap_or(stops.len() - 1)
            .max(1);
        let (x0, c0) = stops[upper - 1];
        let (x1, c1) = stops[upper];
        let t = if x1 > x0 {
            ((x - x0) / (x1 - x0)).clamp(0., 1.)
        } else {
            0.
        };
        for (k, shift) in [16, 8, 0].iter().enumerate() {
            let a = channel(c0, *shift);
            let b = channel(c1, *shift);
            entry[k] = (a + (b - a) * t).round() as u8;
        }
    }
    lut
}

impl Colormap {
    pub const ALL: [Colormap; 11] = [
        Colormap::Jet,
        Colormap::Hot,
        Colormap::Magma,
        Colormap::Inferno,
        Colormap::Plasma,
        Colormap::Bone,
        Colormap::Spring,
        Colormap::Autumn,
        Colormap::Viridis,
        Colormap::Parula,
        Colormap::InvRainbow,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Colormap::Jet => "Jet",
            Colormap::Hot => "Hot",
            Colormap::Magma => "Magma",
            Colormap::Inferno => "Inferno",
            Colormap::Plasma => "Plasma",
            Colormap::Bone => "Bone",
            Colormap::Spring => "Spring",
            Colormap::Autumn => "Autumn",
            Colormap::Viridis => "Viridis",
            Colormap::Parula => "Parula",
            Colormap::InvRainbow => "Inv Rainbow",
        }
    }

    fn stops(self) -> Stops {
        match self {
            Colormap::Jet => JET,
            Colormap::Hot => HOT,
            Colormap::Magma => MAGMA,
            Colormap::Inferno => INFERNO,
            Colormap::Plasma => PLASMA,
            Colormap::Bone => BONE,
            Colormap::Spring => SPRING,
            Colormap::Autumn => AUTUMN,
            Colormap::Viridis => VIRIDIS,
            Colormap::Parula => PARULA,
            Colormap::InvRainbow => RAINBOW,
        }
    }

    /// Whether red and blue must be exchanged after mapping.
    pub fn swaps_red_blue(self) -> bool {
        self == Colormap::InvRainbow
    }

    pub fn lut(self) -> &'static Lut {
        &LUTS[self.index()]
    }

    /// Map an intensity image through the plain table.
    pub fn map(self, gray: &GrayImage) -> RgbImage {
        let lut = self.lut();
        let (width, height) = gray.dimensions();
        let mut out = RgbImage::new(width, height);
        out.par_chunks_mut(3)
            .zip(gray.as_raw().par_iter())
            .for_each(|(px, &g)| px.copy_from_slice(&lut[g as usize]));
        out
    }
}

impl Default for Colormap {
    fn default() -> Self {
        Colormap::Jet
    }
}
