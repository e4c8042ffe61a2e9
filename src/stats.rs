//! Frame-level temperature statistics.
//!
//! Extremum locations follow row-major scan order: on ties
//! the pixel with the smallest linear index wins, matching
//! a linear argmax/argmin over the field.
use std::ops::AddAssign;

use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde_derive::*;

use crate::{frame::SensorGeometry, temperature::round_to};

/// A `(row, col)` pixel location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPos {
    pub row: usize,
    pub col: usize,
}

impl PixelPos {
    pub fn new(row: usize, col: usize) -> Self {
        PixelPos { row, col }
    }

    /// Clamp to the bounds of a `width x height` grid.
    pub fn clamped(self, geometry: SensorGeometry) -> Self {
        PixelPos {
            row: self.row.min(geometry.height.saturating_sub(1)),
            col: self.col.min(geometry.width.saturating_sub(1)),
        }
    }

    /// Scale from `source` to `display` resolution, each
    /// axis independently, flooring.
    pub fn remap(self, source: SensorGeometry, display: SensorGeometry) -> Self {
        PixelPos {
            row: self.row * display.height / source.height.max(1),
            col: self.col * display.width / source.width.max(1),
        }
    }
}

/// A value at a linear (row-major) index.
#[derive(Clone, Copy, Debug)]
pub struct Sample {
    pub index: usize,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Extremum {
    pub index: usize,
    pub value: f64,
}

/// Running aggregate over samples. Merging two aggregates
/// keeps the earliest index among equal extrema regardless
/// of merge order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub sum: f64,
    pub min: Option<Extremum>,
    pub max: Option<Extremum>,
}

impl Stats {
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn better(
    current: Option<Extremum>,
    candidate: Extremum,
    wins: impl Fn(f64, f64) -> bool,
) -> Option<Extremum> {
    match current {
        None => Some(candidate),
        Some(cur) => {
            if wins(candidate.value, cur.value)
                || (candidate.value == cur.value && candidate.index < cur.index)
            {
                Some(candidate)
            } else {
                Some(cur)
            }
        }
    }
}

impl AddAssign<Sample> for Stats {
    fn add_assign(&mut self, s: Sample) {
        let e = Extremum {
            index: s.index,
            value: s.value,
        };
        self.count += 1;
        self.sum += s.value;
        self.min = better(self.min, e, |a, b| a < b);
        self.max = better(self.max, e, |a, b| a > b);
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        self.count += other.count;
        self.sum += other.sum;
        if let Some(e) = other.min {
            self.min = better(self.min, e, |a, b| a < b);
        }
        if let Some(e) = other.max {
            self.max = better(self.max, e, |a, b| a > b);
        }
    }
}

/// Aggregates of one frame, with source-resolution
/// locations and their display-resolution counterparts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrameStatistics {
    pub max: f64,
    pub min: f64,
    pub average: f64,
    pub target: f64,
    pub max_pos: PixelPos,
    pub min_pos: PixelPos,
    pub target_pos: PixelPos,
    pub display: DisplayPositions,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DisplayPositions {
    pub max: PixelPos,
    pub min: PixelPos,
    pub target: PixelPos,
}

/// Computes [`FrameStatistics`]. Holds no per-frame state.
#[derive(Clone, Copy, Debug)]
pub struct TemperatureStatistics {
    precision: u32,
}

impl Default for TemperatureStatistics {
    fn default() -> Self {
        TemperatureStatistics { precision: 2 }
    }
}

impl TemperatureStatistics {
    pub fn new(precision: u32) -> Self {
        TemperatureStatistics { precision }
    }

    /// Aggregate the whole field.
    ///
    /// Rows are reduced in parallel and merged in row order
    /// so the floating-point sum does not depend on thread
    /// scheduling.
    pub fn aggregate(&self, field: ArrayView2<f64>) -> Stats {
        let ncols = field.ncols();
        let rows: Vec<Stats> = field
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .map(|(row, values)| {
                let mut acc = Stats::default();
                for (col, &value) in values.iter().enumerate() {
                    acc += Sample {
                        index: row * ncols + col,
                        value,
                    };
                }
                acc
            })
            .collect();

        let mut stats = Stats::default();
        for row in rows.iter() {
            stats += row;
        }
        stats
    }

    /// Compute the statistics of `field`, reading the target
    /// at the clamped `target` location and mapping all
    /// locations onto `display`.
    pub fn compute(
        &self,
        field: ArrayView2<f64>,
        target: PixelPos,
        display: SensorGeometry,
    ) -> FrameStatistics {
        let (height, width) = field.dim();
        let source = SensorGeometry { width, height };
        let stats = self.aggregate(field);

        let to_pos = |e: Option<Extremum>| {
            e.map(|e| PixelPos::new(e.index / width.max(1), e.index % width.max(1)))
                .unwrap_or_default()
        };
        let max_pos = to_pos(stats.max);
        let min_pos = to_pos(stats.min);
        let target_pos = target.clamped(source);

        let target_value = if width > 0 && height > 0 {
            field[(target_pos.row, target_pos.col)]
        } else {
            f64::NAN
        };

        FrameStatistics {
            max: stats.max.map(|e| e.value).unwrap_or(f64::NAN),
            min: stats.min.map(|e| e.value).unwrap_or(f64::NAN),
            average: stats
                .mean()
                .map(|m| round_to(m, self.precision))
                .unwrap_or(f64::NAN),
            target: target_value,
            max_pos,
            min_pos,
            target_pos,
            display: DisplayPositions {
                max: max_pos.remap(source, display),
                min: min_pos.remap(source, display),
                target: target_pos.remap(source, display),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn tc001() -> SensorGeometry {
        SensorGeometry::TC001
    }

    fn scaled(scale: usize) -> SensorGeometry {
        SensorGeometry {
            width: 256 * scale,
            height: 192 * scale,
        }
    }

    #[test]
    fn flat_field() {
        let field = Array2::from_elem((192, 256), 23.45);
        let stats = TemperatureStatistics::default().compute(
            field.view(),
            PixelPos::new(96, 128),
            tc001(),
        );
        assert_eq!(stats.max, 23.45);
        assert_eq!(stats.min, 23.45);
        assert_eq!(stats.average, 23.45);
        assert_eq!(stats.target, 23.45);
        assert_eq!(stats.max_pos, PixelPos::new(0, 0));
        assert_eq!(stats.min_pos, PixelPos::new(0, 0));
    }

    #[test]
    fn unique_maximum_is_remapped() {
        let mut field = Array2::from_elem((192, 256), 20.);
        field[(5, 10)] = 40.;
        field[(100, 200)] = 5.;
        let stats = TemperatureStatistics::default().compute(
            field.view(),
            PixelPos::new(0, 0),
            scaled(3),
        );
        assert_eq!(stats.max, 40.);
        assert_eq!(stats.max_pos, PixelPos::new(5, 10));
        assert_eq!(stats.display.max, PixelPos::new(5 * 576 / 192, 10 * 768 / 256));
        assert_eq!(stats.display.max, PixelPos::new(15, 30));
        assert_eq!(stats.min_pos, PixelPos::new(100, 200));
        assert_eq!(stats.display.min, PixelPos::new(300, 600));
    }

    #[test]
    fn remap_floors_each_axis() {
        let source = SensorGeometry {
            width: 3,
            height: 7,
        };
        let display = SensorGeometry {
            width: 10,
            height: 10,
        };
        assert_eq!(PixelPos::new(6, 2).remap(source, display), PixelPos::new(8, 6));
    }

    #[test]
    fn first_occurrence_wins_on_ties() {
        let mut field = Array2::from_elem((4, 5), 1.);
        field[(2, 1)] = 9.;
        field[(1, 3)] = 9.;
        field[(3, 4)] = 9.;
        field[(0, 4)] = -1.;
        field[(3, 0)] = -1.;
        let stats = TemperatureStatistics::default().compute(
            field.view(),
            PixelPos::default(),
            SensorGeometry { width: 5, height: 4 },
        );
        assert_eq!(stats.max_pos, PixelPos::new(1, 3));
        assert_eq!(stats.min_pos, PixelPos::new(0, 4));
    }

    #[test]
    fn merge_order_does_not_change_extrema() {
        let mut a = Stats::default();
        a += Sample { index: 7, value: 3. };
        let mut b = Stats::default();
        b += Sample { index: 2, value: 3. };

        let mut ab = a;
        ab += &b;
        let mut ba = b;
        ba += &a;
        assert_eq!(ab.max, ba.max);
        assert_eq!(ab.max.unwrap().index, 2);
    }

    #[test]
    fn target_is_clamped() {
        let mut field = Array2::from_elem((192, 256), 0.);
        field[(191, 255)] = 12.5;
        let stats = TemperatureStatistics::default().compute(
            field.view(),
            PixelPos::new(500, 900),
            tc001(),
        );
        assert_eq!(stats.target_pos, PixelPos::new(191, 255));
        assert_eq!(stats.target, 12.5);
    }

    #[test]
    fn average_is_rounded() {
        let mut field = Array2::from_elem((1, 3), 20.);
        field[(0, 2)] = 21.;
        let stats = TemperatureStatistics::new(2).compute(
            field.view(),
            PixelPos::default(),
            SensorGeometry { width: 3, height: 1 },
        );
        assert_eq!(stats.average, 20.33);
    }
}
