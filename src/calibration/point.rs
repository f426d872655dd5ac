//! Calibration samples and the six reference colors
//!
//! A [`CalibrationPoint`] pairs a raw sensor reading with the RGB value the
//! sample is known to have. Points are stored in a [`PointSet`], which holds
//! at most one point per [`CalibrationColor`].

use crate::constants::{reference, sensor};
use crate::error::CalibrationError;
use crate::ports::SensorSettings;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Raw three-channel reading in the sensor's native 16-bit range
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawXyz {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

impl RawXyz {
    pub const fn new(x: u16, y: u16, z: u16) -> Self {
        Self { x, y, z }
    }

    /// True when every channel reads zero
    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }

    pub fn max_channel(&self) -> u16 {
        self.x.max(self.y).max(self.z)
    }

    /// Clamp every channel to `ceiling`
    pub fn clamped(self, ceiling: u16) -> Self {
        Self::new(self.x.min(ceiling), self.y.min(ceiling), self.z.min(ceiling))
    }

    /// Per-channel subtraction, floored at zero
    pub fn saturating_sub(self, other: RawXyz) -> Self {
        Self::new(
            self.x.saturating_sub(other.x),
            self.y.saturating_sub(other.y),
            self.z.saturating_sub(other.z),
        )
    }

    pub fn channels(&self) -> [u16; 3] {
        [self.x, self.y, self.z]
    }

    /// Channels as raw counts
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Channels divided by the sensor's full-scale value, in [0, 1]
    pub fn normalized(self) -> Vector3<f64> {
        self.to_vector() / sensor::FULL_SCALE as f64
    }
}

impl From<[u16; 3]> for RawXyz {
    fn from(channels: [u16; 3]) -> Self {
        Self::new(channels[0], channels[1], channels[2])
    }
}

impl fmt::Display for RawXyz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X={} Y={} Z={}", self.x, self.y, self.z)
    }
}

/// The six reference colors, in auto-calibration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationColor {
    Black,
    White,
    Red,
    Green,
    Blue,
    Yellow,
}

impl CalibrationColor {
    /// Every reference color, in the fixed calibration sequence
    pub const ALL: [CalibrationColor; 6] = [
        CalibrationColor::Black,
        CalibrationColor::White,
        CalibrationColor::Red,
        CalibrationColor::Green,
        CalibrationColor::Blue,
        CalibrationColor::Yellow,
    ];

    /// Position in [`CalibrationColor::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Internal lowercase name used at the API boundary
    pub fn name(self) -> &'static str {
        match self {
            CalibrationColor::Black => "black",
            CalibrationColor::White => "white",
            CalibrationColor::Red => "red",
            CalibrationColor::Green => "green",
            CalibrationColor::Blue => "blue",
            CalibrationColor::Yellow => "yellow",
        }
    }

    /// Name shown to the operator
    pub fn display_name(self) -> &'static str {
        match self {
            CalibrationColor::Black => "Black",
            CalibrationColor::White => "Vivid White",
            CalibrationColor::Red => "Red",
            CalibrationColor::Green => "Green",
            CalibrationColor::Blue => "Blue",
            CalibrationColor::Yellow => "Yellow",
        }
    }

    /// Known RGB value of the reference swatch
    pub fn target(self) -> [u8; 3] {
        match self {
            CalibrationColor::Black => reference::BLACK,
            CalibrationColor::White => reference::WHITE,
            CalibrationColor::Red => reference::RED,
            CalibrationColor::Green => reference::GREEN,
            CalibrationColor::Blue => reference::BLUE,
            CalibrationColor::Yellow => reference::YELLOW,
        }
    }

    /// Black and White anchor every tier; only the chromatic colors are optional
    pub fn can_skip(self) -> bool {
        !matches!(self, CalibrationColor::Black | CalibrationColor::White)
    }

    /// Reference color with exactly this target RGB
    pub fn from_target(target: [u8; 3]) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.target() == target)
    }

    /// Next color in the calibration sequence
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl FromStr for CalibrationColor {
    type Err = CalibrationError;

    /// Accepts the internal or display name, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| {
                c.name().eq_ignore_ascii_case(wanted) || c.display_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| CalibrationError::UnknownColor {
                name: s.to_string(),
            })
    }
}

impl fmt::Display for CalibrationColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A raw reading paired with the RGB value it should map to
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub raw: RawXyz,
    pub target: [u8; 3],
    /// Capture time, seconds since the Unix epoch
    pub timestamp: u64,
    /// Operator or sensor confidence in [0, 1]
    pub quality: f32,
}

impl CalibrationPoint {
    /// Create a point stamped with the current time
    pub fn new(raw: RawXyz, target: [u8; 3], quality: f32) -> Self {
        Self {
            raw,
            target,
            timestamp: now_secs(),
            quality,
        }
    }

    /// Reference color this point belongs to, if its target is a known one
    pub fn color(&self) -> Option<CalibrationColor> {
        CalibrationColor::from_target(self.target)
    }
}

/// Sample taken with illumination off
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DarkOffsetPoint {
    pub point: CalibrationPoint,
    /// Sensor settings in effect at capture; `None` when unknown
    #[serde(default)]
    pub settings: Option<SensorSettings>,
}

impl DarkOffsetPoint {
    pub fn new(raw: RawXyz, settings: Option<SensorSettings>) -> Self {
        Self {
            point: CalibrationPoint::new(raw, reference::DARK_OFFSET, 1.0),
            settings,
        }
    }

    pub fn raw(&self) -> RawXyz {
        self.point.raw
    }
}

/// At most one calibration point per reference color
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointSet {
    slots: [Option<CalibrationPoint>; 6],
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a point for `color`, returning the point it replaced
    pub fn insert(
        &mut self,
        color: CalibrationColor,
        point: CalibrationPoint,
    ) -> Option<CalibrationPoint> {
        self.slots[color.index()].replace(point)
    }

    pub fn get(&self, color: CalibrationColor) -> Option<&CalibrationPoint> {
        self.slots[color.index()].as_ref()
    }

    pub fn contains(&self, color: CalibrationColor) -> bool {
        self.slots[color.index()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }

    /// Stored points in calibration order
    pub fn iter(&self) -> impl Iterator<Item = &CalibrationPoint> {
        self.slots.iter().flatten()
    }

    pub fn to_vec(&self) -> Vec<CalibrationPoint> {
        self.iter().copied().collect()
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
