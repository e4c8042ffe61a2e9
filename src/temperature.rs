//! Functions to compute temperature from raw calibration
//! bytes.
//!
//! The TC001 / P2 Pro report each pixel as a 16-bit reading
//! in 1/64 Kelvin, split across two bytes of the
//! calibration plane. Celsius is
//! `(low + high * 256) / 64 - 273.15`, plus the offset,
//! rounded to the configured precision.
use serde_derive::*;

const CELSIUS_OFFSET: f64 = 273.15;
const RAW_PER_KELVIN: f64 = 64.;

/// Parameters to compute temperatures from raw sensor
/// values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Added to every converted value before rounding.
    pub offset: f64,
    /// Decimal places kept after conversion.
    pub precision: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            offset: 0.,
            precision: 2,
        }
    }
}

impl Calibration {
    pub fn new(offset: f64, precision: u32) -> Self {
        Calibration { offset, precision }
    }

    /// Conversion of a combined 16-bit reading.
    pub fn raw_transform(&self) -> impl Fn(u16) -> f64 {
        let offset = self.offset;
        let precision = self.precision;
        move |raw| round_to(raw as f64 / RAW_PER_KELVIN - CELSIUS_OFFSET + offset, precision)
    }

    /// Conversion of the two calibration bytes of a pixel.
    pub fn temperature_transform(&self) -> impl Fn(u8, u8) -> f64 {
        let t = self.raw_transform();
        move |low, high| t(combine(low, high))
    }

    pub fn bytes_to_temp(&self, low: u8, high: u8) -> f64 {
        self.temperature_transform()(low, high)
    }

    pub fn round(&self, value: f64) -> f64 {
        round_to(value, self.precision)
    }
}

#[inline]
pub fn combine(low: u8, high: u8) -> u16 {
    low as u16 + high as u16 * 256
}

/// Round half away from zero to `digits` decimals.
#[inline]
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reading() {
        // 0x4A00 / 64 = 296 K
        let cal = Calibration::default();
        assert_eq!(cal.bytes_to_temp(0x00, 0x4A), 22.85);
    }

    #[test]
    fn low_byte_contributes_sixty_fourths() {
        let cal = Calibration::default();
        let base = cal.bytes_to_temp(0, 0x4A);
        let next = cal.bytes_to_temp(32, 0x4A);
        assert_eq!(round_to(next - base, 2), 0.5);
    }

    #[test]
    fn offset_is_applied_before_rounding() {
        let cal = Calibration::new(1.5, 2);
        assert_eq!(cal.bytes_to_temp(0x00, 0x4A), 24.35);
    }

    #[test]
    fn conversion_is_pure() {
        let cal = Calibration::default();
        let t = cal.temperature_transform();
        let first: Vec<f64> = (0..=255u8).map(|lo| t(lo, 0x49)).collect();
        let second: Vec<f64> = (0..=255u8).rev().map(|lo| t(lo, 0x49)).collect();
        assert!(first.iter().eq(second.iter().rev()));
    }

    #[test]
    fn precision_is_configurable() {
        let cal = Calibration::new(0., 1);
        assert_eq!(cal.bytes_to_temp(1, 0x4A), 22.9);
    }
}
