//! # ColorMatch Calibration
//!
//! Calibration and correction engine for a tristimulus color sensor.
//!
//! This library turns raw X/Y/Z sensor counts into calibrated RGB by:
//! - Fitting a 3×3 color correction matrix from reference-color samples
//! - Compensating for dark current and flare before the matrix multiply
//! - Degrading gracefully to two-point or naive correction when calibration
//!   is incomplete or numerically unstable
//! - Guiding an operator through a fixed six-color calibration sequence
//!
//! Hardware and storage are reached through the traits in [`ports`].
//!
//! ## Example
//!
//! ```rust
//! use colormatch_calibration::adapters::MemoryStore;
//! use colormatch_calibration::{CalibrationConfig, CalibrationManager, RawXyz};
//!
//! let mut manager = CalibrationManager::new(MemoryStore::new(), CalibrationConfig::default());
//! manager.initialize();
//!
//! manager.upsert("black", RawXyz::new(100, 100, 100), 1.0)?;
//! manager.upsert("white", RawXyz::new(50000, 52000, 48000), 1.0)?;
//!
//! let result = manager.correct(RawXyz::new(50000, 52000, 48000));
//! assert_eq!(result.hex(), "#F7F8F4");
//! # Ok::<(), colormatch_calibration::CalibrationError>(())
//! ```

use palette::Srgb;
use serde::{Deserialize, Serialize};

pub mod adapters;
pub mod calibration;
pub mod color;
pub mod config;
pub mod constants;
pub mod error;
pub mod persistence;
pub mod ports;

pub use calibration::{
    AutoCalibrationState, AutoCalibrationStatus, BlackStage, CalibrationColor, CalibrationManager,
    CalibrationPoint, CalibrationStatus, ColorCorrectionMatrix, CompensationLevel, CorrectionTier,
    MatrixSolver, RawXyz,
};
pub use config::CalibrationConfig;
pub use error::{CalibrationError, Result};

/// Output of runtime correction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Corrected color, 8 bits per channel
    pub color: Srgb<u8>,
    /// Tier that produced the color
    pub tier: CorrectionTier,
    /// False when no calibration could be applied (uninitialized, naive fallback)
    pub calibrated: bool,
}

impl Correction {
    pub fn new(color: Srgb<u8>, tier: CorrectionTier, calibrated: bool) -> Self {
        Self {
            color,
            tier,
            calibrated,
        }
    }

    /// Hexadecimal representation, e.g. `#F7F8F4`
    pub fn hex(&self) -> String {
        color::srgb_to_hex(self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correction_serialization() {
        let result = Correction::new(Srgb::new(200, 30, 30), CorrectionTier::Matrix, true);

        let json = serde_json::to_string(&result).unwrap();
        let deserialized: Correction = serde_json::from_str(&json).unwrap();

        assert_eq!(result, deserialized);
        assert!(json.contains("\"matrix\""));
    }

    #[test]
    fn test_correction_hex() {
        let result = Correction::new(Srgb::new(30, 30, 200), CorrectionTier::TwoPoint, true);
        assert_eq!(result.hex(), "#1E1EC8");
    }
}
