//! Output color encoding
//!
//! This module turns linear RGB produced by the correction matrix into
//! display-ready 8-bit sRGB.

pub mod conversion;

pub use conversion::{compress_to_limit, encode_srgb, quantize, srgb_to_hex};
