//! Sensor port - abstraction for reading averaged tristimulus samples
//!
//! This trait lets the auto-calibration stages acquire samples without
//! knowing the specific sensor driver (I2C part, simulator, mock).

use crate::calibration::RawXyz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for sensor operations
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorError {
    /// Failed to read from sensor
    #[error("failed to read sensor")]
    ReadFailed,
    /// Sensor not initialized
    #[error("sensor not initialized")]
    NotInitialized,
    /// Timeout waiting for an integration cycle
    #[error("timed out waiting for sensor")]
    Timeout,
}

/// The two infrared channels reported alongside X/Y/Z
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrChannels {
    pub ir1: u16,
    pub ir2: u16,
}

/// Acquisition settings a dark offset is only valid for
///
/// Dark current scales with gain and integration time, so a dark offset
/// captured under one setting must be re-captured when either changes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Analog gain multiplier
    pub gain: f32,
    /// Integration time in milliseconds
    pub integration_time_ms: u16,
}

/// Port for reading averaged sensor samples
///
/// Calls are synchronous; an implementation that talks to real hardware
/// should bound them with its own timeout and report [`SensorError::Timeout`].
pub trait SensorReader {
    /// Read an averaged three-channel sample
    fn read_averaged(&mut self) -> Result<RawXyz, SensorError>;

    /// Read an averaged sample together with both IR channels
    fn read_averaged_with_ir(&mut self) -> Result<(RawXyz, IrChannels), SensorError>;
}
