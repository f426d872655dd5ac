//! Least-squares fitting of the color correction matrix
//!
//! Each output channel is fitted independently: with `A` the n×3 matrix of
//! normalized raw readings and `b` the normalized target channel, the
//! coefficients are `(AᵗA + λI)⁻¹ Aᵗb`. The three coefficient triples become
//! the rows of the matrix.

use super::matrix::ColorCorrectionMatrix;
use super::point::CalibrationPoint;
use crate::config::SolverConfig;
use crate::constants::sensor;
use crate::error::{CalibrationError, Result};
use log::{debug, info, warn};
use nalgebra::{Matrix3, RowVector3, Vector3};
use std::collections::HashSet;

const CHANNEL_NAMES: [&str; 3] = ["red", "green", "blue"];
const NORMAL_EQUATION_CONTEXT: [&str; 3] = [
    "red channel normal equations",
    "green channel normal equations",
    "blue channel normal equations",
];

/// Fits a [`ColorCorrectionMatrix`] from calibration points
#[derive(Debug, Clone, Default)]
pub struct MatrixSolver {
    config: SolverConfig,
}

impl MatrixSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Fit a matrix to `points`
    ///
    /// # Errors
    ///
    /// Returns a solver error (see [`CalibrationError::is_solver_error`]) if
    /// the point set is invalid, lacks diversity, or yields a singular or
    /// ill-conditioned matrix. Nothing is mutated on failure.
    pub fn solve(&self, points: &[CalibrationPoint]) -> Result<ColorCorrectionMatrix> {
        let result = self.fit(points);
        match &result {
            Ok(matrix) => info!(
                "Fitted correction matrix from {} points (det={:.4}, cond={:.2})",
                points.len(),
                matrix.determinant,
                matrix.condition_number
            ),
            Err(e) => warn!("Matrix fit rejected: {}", e),
        }
        result
    }

    fn fit(&self, points: &[CalibrationPoint]) -> Result<ColorCorrectionMatrix> {
        validate(points)?;
        self.check_diversity(points)?;

        let r = self.solve_channel(points, 0)?;
        let g = self.solve_channel(points, 1)?;
        let b = self.solve_channel(points, 2)?;
        let coefficients = Matrix3::from_rows(&[r, g, b]);

        let matrix = ColorCorrectionMatrix::new(coefficients, &self.config);
        if matrix.determinant.abs() < self.config.min_determinant {
            return Err(CalibrationError::SingularMatrix {
                context: "fitted matrix",
                determinant: matrix.determinant,
            });
        }
        if matrix.condition_number > self.config.max_condition_number {
            return Err(CalibrationError::IllConditioned {
                condition_number: matrix.condition_number,
                limit: self.config.max_condition_number,
            });
        }
        Ok(matrix)
    }

    fn check_diversity(&self, points: &[CalibrationPoint]) -> Result<()> {
        for (channel, name) in CHANNEL_NAMES.into_iter().enumerate() {
            let range = span(points.iter().map(|p| p.target[channel]));
            if range < self.config.min_target_range {
                return Err(CalibrationError::InsufficientTargetDiversity {
                    channel: name,
                    range,
                    minimum: self.config.min_target_range,
                });
            }
        }

        let [x, y, z] = [0, 1, 2].map(|c| span(points.iter().map(|p| p.raw.channels()[c])));
        let minimum = self.config.min_sensor_range;
        if x < minimum || y < minimum || z < minimum {
            return Err(CalibrationError::InsufficientSensorDiversity { x, y, z, minimum });
        }
        Ok(())
    }

    /// Coefficients mapping normalized XYZ onto one output channel
    fn solve_channel(&self, points: &[CalibrationPoint], channel: usize) -> Result<RowVector3<f64>> {
        let mut ata = Matrix3::<f64>::zeros();
        let mut atb = Vector3::<f64>::zeros();
        for point in points {
            let a = point.raw.normalized();
            let b = point.target[channel] as f64 / 255.0;
            ata += a * a.transpose();
            atb += a * b;
        }
        ata += Matrix3::identity() * self.config.regularization;

        let determinant = ata.determinant();
        let singular = CalibrationError::SingularMatrix {
            context: NORMAL_EQUATION_CONTEXT[channel],
            determinant,
        };
        if determinant.abs() < self.config.min_determinant {
            return Err(singular);
        }
        let inverse = ata.try_inverse().ok_or(singular)?;
        let coefficients = inverse * atb;

        debug!(
            "{} coefficients: [{:.6}, {:.6}, {:.6}]",
            CHANNEL_NAMES[channel], coefficients.x, coefficients.y, coefficients.z
        );
        Ok(coefficients.transpose())
    }
}

/// Reject point sets no fit could sensibly use
fn validate(points: &[CalibrationPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(CalibrationError::EmptyPointSet);
    }

    let mut seen = HashSet::new();
    for point in points {
        if point.raw.is_zero() {
            return Err(CalibrationError::InvalidPoint {
                target: point.target,
            });
        }
        if point.raw.max_channel() >= sensor::SOLVER_SATURATION {
            return Err(CalibrationError::SaturatedPoint {
                target: point.target,
            });
        }
        if !seen.insert(point.target) {
            return Err(CalibrationError::DuplicateTarget {
                target: point.target,
            });
        }
    }
    Ok(())
}

/// Max minus min; zero for an empty sequence
fn span<T>(mut values: impl Iterator<Item = T>) -> T
where
    T: Ord + Copy + Default + std::ops::Sub<Output = T>,
{
    let Some(first) = values.next() else {
        return T::default();
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    max - min
}
