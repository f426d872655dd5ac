//! Linear RGB to 8-bit sRGB encoding
//!
//! Provides the steps the compensation pipelines share:
//! - sRGB transfer curve (palette's exact piecewise encoding)
//! - Hue-preserving compression of over-range colors
//! - Truncating quantization to bytes
//! - Hex color representation

use nalgebra::Vector3;
use palette::{LinSrgb, Srgb};

/// Apply the sRGB transfer curve to a linear color
///
/// Each channel is clamped to [0, 1] first, then encoded with the piecewise
/// curve: `12.92 * v` up to 0.0031308, `1.055 * v^(1/2.4) - 0.055` above.
///
/// # Arguments
///
/// * `linear` - Linear RGB, nominally in [0, 1]
///
/// # Returns
///
/// Gamma-encoded RGB in [0, 1]
pub fn encode_srgb(linear: Vector3<f64>) -> Vector3<f64> {
    let clamped = linear.map(|v| v.clamp(0.0, 1.0));
    let encoded: Srgb<f64> = Srgb::from_linear(LinSrgb::new(clamped.x, clamped.y, clamped.z));
    Vector3::new(encoded.red, encoded.green, encoded.blue)
}

/// Scale all channels by the same factor so none exceeds `limit`
///
/// Ratios between channels (and therefore hue) are preserved. Colors
/// already within the limit are returned unchanged.
pub fn compress_to_limit(rgb: Vector3<f64>, limit: f64) -> Vector3<f64> {
    let peak = rgb.x.max(rgb.y).max(rgb.z);
    if peak > limit {
        rgb * (limit / peak)
    } else {
        rgb
    }
}

/// Quantize a 0-255 scaled color to bytes
///
/// Channels are clamped to [0, 255] and truncated toward zero.
pub fn quantize(rgb: Vector3<f64>) -> Srgb<u8> {
    let byte = |v: f64| v.clamp(0.0, 255.0) as u8;
    Srgb::new(byte(rgb.x), byte(rgb.y), byte(rgb.z))
}

/// Convert an 8-bit sRGB color to a hexadecimal string
///
/// # Returns
///
/// Hex color string (e.g., "#FF0000")
pub fn srgb_to_hex(srgb: Srgb<u8>) -> String {
    format!("#{:02X}{:02X}{:02X}", srgb.red, srgb.green, srgb.blue)
}
