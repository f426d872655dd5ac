//! Color correction matrix and compensation pipelines
//!
//! [`ColorCorrectionMatrix::apply`] is the single, side-effect-free entry
//! point that turns a raw reading into RGB. The [`CompensationLevel`] picks
//! the pre/post-processing wrapped around the 3×3 multiply:
//!
//! - **None**: normalize by full scale, multiply, scale to 0-255 with
//!   hue-preserving overflow compression
//! - **BlackOnly**: subtract the black reference, multiply, normalize by the
//!   brightest channel, sRGB-encode
//! - **Professional**: remove dark current and flare, normalize by a fixed
//!   full scale, multiply, clamp, sRGB-encode
//! - **Auto**: the richest of the above the available references allow

use super::point::RawXyz;
use crate::color::{compress_to_limit, encode_srgb, quantize};
use crate::config::{CorrectionConfig, SolverConfig};
use crate::constants::sensor;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use palette::Srgb;
use serde::{Deserialize, Serialize};

/// Pre/post-processing applied around the matrix multiply
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationLevel {
    None,
    BlackOnly,
    Professional,
    #[default]
    Auto,
}

/// Reference samples the compensating pipelines subtract before the multiply
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReferenceSamples {
    /// Illumination-off reading (dark current)
    pub dark_offset: Option<RawXyz>,
    /// Illumination-on reading over the black swatch
    pub black_reference: Option<RawXyz>,
}

/// A compensation level with its required samples bound
#[derive(Clone, Copy, Debug, PartialEq)]
enum Pipeline {
    Basic,
    BlackOnly { black: RawXyz },
    Professional { dark: RawXyz, black: RawXyz },
}

impl Pipeline {
    fn level(self) -> CompensationLevel {
        match self {
            Pipeline::Basic => CompensationLevel::None,
            Pipeline::BlackOnly { .. } => CompensationLevel::BlackOnly,
            Pipeline::Professional { .. } => CompensationLevel::Professional,
        }
    }
}

impl CompensationLevel {
    /// Concrete level that will run given the available references
    ///
    /// `Auto` picks the richest level the references support. An explicit
    /// level whose references are missing degrades one step at a time:
    /// Professional, then BlackOnly, then None.
    pub fn resolve(self, refs: &ReferenceSamples) -> CompensationLevel {
        self.pipeline(refs).level()
    }

    fn pipeline(self, refs: &ReferenceSamples) -> Pipeline {
        match (self, refs.dark_offset, refs.black_reference) {
            (CompensationLevel::Professional | CompensationLevel::Auto, Some(dark), Some(black)) => {
                Pipeline::Professional { dark, black }
            }
            (CompensationLevel::None, _, _) => Pipeline::Basic,
            (_, _, Some(black)) => Pipeline::BlackOnly { black },
            (_, _, None) => Pipeline::Basic,
        }
    }
}

/// Result of running a raw reading through the matrix
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatrixOutput {
    pub rgb: Srgb<u8>,
    /// Level that actually ran after `Auto` resolution and degradation
    pub level: CompensationLevel,
    /// False when the matrix was invalid and the naive fallback was used
    pub ok: bool,
}

/// 3×3 transform from normalized sensor channels to linear RGB
///
/// Rows are the red, green and blue output channels. Offsets are handled by
/// the pipelines subtracting reference samples, never by an affine term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorCorrectionMatrix {
    pub coefficients: Matrix3<f64>,
    pub valid: bool,
    pub determinant: f64,
    pub condition_number: f64,
}

impl Default for ColorCorrectionMatrix {
    /// Invalid identity; metrics stay zero until a fit succeeds
    fn default() -> Self {
        Self {
            coefficients: Matrix3::identity(),
            valid: false,
            determinant: 0.0,
            condition_number: 0.0,
        }
    }
}

impl ColorCorrectionMatrix {
    /// Wrap `coefficients`, computing determinant, condition number and validity
    ///
    /// The condition number is `‖M‖F · ‖M⁻¹‖F`; a non-invertible matrix gets
    /// an infinite condition number.
    pub fn new(coefficients: Matrix3<f64>, limits: &SolverConfig) -> Self {
        let determinant = coefficients.determinant();
        let condition_number = if determinant.abs() < limits.min_determinant {
            f64::INFINITY
        } else {
            coefficients
                .try_inverse()
                .map(|inverse| coefficients.norm() * inverse.norm())
                .unwrap_or(f64::INFINITY)
        };
        let valid = determinant.abs() >= limits.min_determinant
            && condition_number <= limits.max_condition_number;

        Self {
            coefficients,
            valid,
            determinant,
            condition_number,
        }
    }

    /// Mark the matrix unusable, keeping its last coefficients for inspection
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Correct a raw reading
    ///
    /// # Arguments
    ///
    /// * `raw` - Sensor reading in native counts
    /// * `level` - Requested compensation; degraded if references are missing
    /// * `refs` - Dark-offset and black-reference samples, if captured
    /// * `config` - Pipeline constants
    ///
    /// # Returns
    ///
    /// The 8-bit RGB estimate, the level that ran, and whether the matrix was
    /// usable. An invalid matrix falls back to `raw / 256` per channel.
    pub fn apply(
        &self,
        raw: RawXyz,
        level: CompensationLevel,
        refs: &ReferenceSamples,
        config: &CorrectionConfig,
    ) -> MatrixOutput {
        if !self.valid {
            return MatrixOutput {
                rgb: uncalibrated(raw),
                level: CompensationLevel::None,
                ok: false,
            };
        }

        let pipeline = level.pipeline(refs);
        if raw.is_zero() {
            return MatrixOutput {
                rgb: Srgb::new(0, 0, 0),
                level: pipeline.level(),
                ok: true,
            };
        }

        if raw.max_channel() > sensor::SAFE_CEILING {
            debug!("Clamping near-saturated reading {} for correction", raw);
        }
        let raw = raw.clamped(sensor::SAFE_CEILING);

        let rgb = match pipeline {
            Pipeline::Basic => self.basic(raw),
            Pipeline::BlackOnly { black } => self.black_only(raw, black),
            Pipeline::Professional { dark, black } => {
                self.professional(raw, dark, black, config.professional_full_scale)
            }
        };

        MatrixOutput {
            rgb,
            level: pipeline.level(),
            ok: true,
        }
    }

    fn multiply(&self, v: Vector3<f64>) -> Vector3<f64> {
        self.coefficients * v
    }

    fn basic(&self, raw: RawXyz) -> Srgb<u8> {
        let linear = self.multiply(raw.normalized());
        quantize(compress_to_limit(linear * 255.0, 255.0))
    }

    fn black_only(&self, raw: RawXyz, black: RawXyz) -> Srgb<u8> {
        let compensated = raw.saturating_sub(black);
        let linear = self.multiply(compensated.to_vector()) / 255.0;
        let peak = linear.x.max(linear.y).max(linear.z).max(1.0);
        quantize(encode_srgb(linear / peak) * 255.0)
    }

    fn professional(&self, raw: RawXyz, dark: RawXyz, black: RawXyz, full_scale: f64) -> Srgb<u8> {
        let signal = raw.saturating_sub(dark);
        let flare = black.saturating_sub(dark);
        let compensated = signal.saturating_sub(flare);

        let linear = self
            .multiply(compensated.to_vector() / full_scale)
            .map(|v| v.clamp(0.0, 1.0));
        quantize(compress_to_limit(encode_srgb(linear) * 255.0, 255.0))
    }
}

/// Naive per-channel normalization used without a usable calibration
pub fn uncalibrated(raw: RawXyz) -> Srgb<u8> {
    let byte = |v: u16| (v as f64 / sensor::UNCALIBRATED_DIVISOR).min(255.0) as u8;
    Srgb::new(byte(raw.x), byte(raw.y), byte(raw.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ColorCorrectionMatrix {
        ColorCorrectionMatrix::new(Matrix3::identity(), &SolverConfig::default())
    }

    fn rgb(c: Srgb<u8>) -> (u8, u8, u8) {
        (c.red, c.green, c.blue)
    }

    fn near(actual: u8, expected: u8) -> bool {
        actual.abs_diff(expected) <= 1
    }

    #[test]
    fn test_identity_is_valid() {
        let m = identity();
        assert!(m.valid);
        assert!((m.determinant - 1.0).abs() < 1e-12);
        assert!((m.condition_number - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_singular_matrix_is_invalid() {
        let m = ColorCorrectionMatrix::new(
            Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0),
            &SolverConfig::default(),
        );
        assert!(!m.valid);
        assert!(m.condition_number.is_infinite());
    }

    #[test]
    fn test_ill_conditioned_matrix_is_invalid() {
        let m = ColorCorrectionMatrix::new(
            Matrix3::from_diagonal(&Vector3::new(1000.0, 1.0, 0.01)),
            &SolverConfig::default(),
        );
        assert!(m.determinant.abs() >= 1e-6);
        assert!(m.condition_number > 1000.0);
        assert!(!m.valid);
    }

    #[test]
    fn test_auto_resolution() {
        let dark = RawXyz::new(10, 10, 10);
        let black = RawXyz::new(500, 500, 500);
        let both = ReferenceSamples {
            dark_offset: Some(dark),
            black_reference: Some(black),
        };
        let black_only = ReferenceSamples {
            dark_offset: None,
            black_reference: Some(black),
        };
        let dark_only = ReferenceSamples {
            dark_offset: Some(dark),
            black_reference: None,
        };

        assert_eq!(CompensationLevel::Auto.resolve(&both), CompensationLevel::Professional);
        assert_eq!(CompensationLevel::Auto.resolve(&black_only), CompensationLevel::BlackOnly);
        assert_eq!(CompensationLevel::Auto.resolve(&dark_only), CompensationLevel::None);
        assert_eq!(
            CompensationLevel::Auto.resolve(&ReferenceSamples::default()),
            CompensationLevel::None
        );
    }

    #[test]
    fn test_explicit_levels_degrade_one_step() {
        let black_only = ReferenceSamples {
            dark_offset: None,
            black_reference: Some(RawXyz::new(500, 500, 500)),
        };
        assert_eq!(
            CompensationLevel::Professional.resolve(&black_only),
            CompensationLevel::BlackOnly
        );
        assert_eq!(
            CompensationLevel::Professional.resolve(&ReferenceSamples::default()),
            CompensationLevel::None
        );
        assert_eq!(
            CompensationLevel::BlackOnly.resolve(&ReferenceSamples::default()),
            CompensationLevel::None
        );
        assert_eq!(CompensationLevel::None.resolve(&black_only), CompensationLevel::None);
    }

    #[test]
    fn test_invalid_matrix_falls_back() {
        let out = ColorCorrectionMatrix::default().apply(
            RawXyz::new(25600, 512, 65535),
            CompensationLevel::Auto,
            &ReferenceSamples::default(),
            &CorrectionConfig::default(),
        );
        assert!(!out.ok);
        assert_eq!(rgb(out.rgb), (100, 2, 255));
    }

    #[test]
    fn test_zero_input_is_black_and_ok() {
        let out = identity().apply(
            RawXyz::default(),
            CompensationLevel::None,
            &ReferenceSamples::default(),
            &CorrectionConfig::default(),
        );
        assert!(out.ok);
        assert_eq!(rgb(out.rgb), (0, 0, 0));
    }

    #[test]
    fn test_basic_pipeline() {
        let out = identity().apply(
            RawXyz::new(13000, 26000, 39000),
            CompensationLevel::None,
            &ReferenceSamples::default(),
            &CorrectionConfig::default(),
        );
        assert!(out.ok);
        assert_eq!(out.level, CompensationLevel::None);
        assert_eq!(rgb(out.rgb), (50, 101, 151));
    }

    #[test]
    fn test_basic_pipeline_preserves_hue_on_overflow() {
        let doubled = ColorCorrectionMatrix::new(
            Matrix3::identity() * 2.0,
            &SolverConfig::default(),
        );
        let out = doubled.apply(
            RawXyz::new(60000, 30000, 15000),
            CompensationLevel::None,
            &ReferenceSamples::default(),
            &CorrectionConfig::default(),
        );
        assert!(near(out.rgb.red, 255));
        assert!(near(out.rgb.green, 127));
        assert!(near(out.rgb.blue, 63));
    }

    #[test]
    fn test_black_only_pipeline() {
        let refs = ReferenceSamples {
            dark_offset: None,
            black_reference: Some(RawXyz::new(1000, 1000, 1000)),
        };
        let out = identity().apply(
            RawXyz::new(11000, 6000, 3500),
            CompensationLevel::Auto,
            &refs,
            &CorrectionConfig::default(),
        );
        assert_eq!(out.level, CompensationLevel::BlackOnly);
        assert!(out.rgb.red >= 254);
        assert!(near(out.rgb.green, 187));
        assert!(near(out.rgb.blue, 136));
    }

    #[test]
    fn test_professional_pipeline_removes_flare() {
        let refs = ReferenceSamples {
            dark_offset: Some(RawXyz::new(500, 500, 500)),
            black_reference: Some(RawXyz::new(800, 800, 800)),
        };
        let out = identity().apply(
            RawXyz::new(2800, 1300, 800),
            CompensationLevel::Auto,
            &refs,
            &CorrectionConfig::default(),
        );
        assert_eq!(out.level, CompensationLevel::Professional);
        assert!(near(out.rgb.red, 185));
        assert!(near(out.rgb.green, 97));
        assert_eq!(out.rgb.blue, 0);
    }

    #[test]
    fn test_pipelines_are_deterministic() {
        let refs = ReferenceSamples {
            dark_offset: Some(RawXyz::new(500, 500, 500)),
            black_reference: Some(RawXyz::new(800, 800, 800)),
        };
        let m = identity();
        let config = CorrectionConfig::default();
        for level in [
            CompensationLevel::None,
            CompensationLevel::BlackOnly,
            CompensationLevel::Professional,
        ] {
            let a = m.apply(RawXyz::new(4000, 3000, 2000), level, &refs, &config);
            let b = m.apply(RawXyz::new(4000, 3000, 2000), level, &refs, &config);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_uncalibrated_divides_by_256() {
        assert_eq!(rgb(uncalibrated(RawXyz::new(256, 2560, 65000))), (1, 10, 253));
    }
}
