//! Sensor limits and reference values for calibration
//!
//! This module contains compile-time constants describing the tristimulus
//! sensor's numeric range and the reference colors used during calibration.

/// Tristimulus sensor numeric range
pub mod sensor {
    /// Full-scale raw value of a 16-bit channel
    pub const FULL_SCALE: u16 = 65535;

    /// Readings above this are clamped before any correction math
    pub const SAFE_CEILING: u16 = 65000;

    /// Upsert accepts readings at or above this, with a saturation warning
    pub const SATURATION_WARNING: u16 = 65000;

    /// Solver rejects points with any channel at or above this
    pub const SOLVER_SATURATION: u16 = FULL_SCALE;

    /// Divisor mapping a 16-bit reading onto 0-255 for uncalibrated output
    pub const UNCALIBRATED_DIVISOR: f64 = 256.0;
}

/// Target RGB values of the six reference colors
pub mod reference {
    /// Black reference swatch (illumination on)
    pub const BLACK: [u8; 3] = [5, 5, 5];

    /// "Vivid White" reference swatch
    pub const WHITE: [u8; 3] = [247, 248, 244];

    /// Strong red primary
    pub const RED: [u8; 3] = [200, 30, 30];

    /// Strong green primary
    pub const GREEN: [u8; 3] = [30, 200, 30];

    /// Strong blue primary
    pub const BLUE: [u8; 3] = [30, 30, 200];

    pub const YELLOW: [u8; 3] = [230, 220, 50];

    /// Dark offset is captured with illumination off; it models true black
    pub const DARK_OFFSET: [u8; 3] = [0, 0, 0];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_ceilings_ordered() {
        assert!(sensor::SAFE_CEILING < sensor::FULL_SCALE);
        assert!(sensor::SATURATION_WARNING <= sensor::SOLVER_SATURATION);
    }

    #[test]
    fn test_reference_colors_distinct() {
        let all = [
            reference::BLACK,
            reference::WHITE,
            reference::RED,
            reference::GREEN,
            reference::BLUE,
            reference::YELLOW,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
