//! Illumination port - abstraction for the sample LED

use thiserror::Error;

/// Error type for illumination operations
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IlluminationError {
    /// Driver rejected the requested level
    #[error("failed to set brightness to {level}")]
    SetFailed { level: u8 },
    /// LED driver not available
    #[error("illumination driver not available")]
    Unavailable,
}

/// Port for controlling the sample illumination
pub trait IlluminationControl {
    /// Set brightness, 0 (off) to 255
    fn set_brightness(&mut self, level: u8) -> Result<(), IlluminationError>;

    /// Current brightness level
    fn brightness(&self) -> u8;

    /// Block until the light output has settled after a change
    ///
    /// The default does nothing; drivers with a measurable settling time
    /// override it.
    fn wait_stable(&mut self) {}
}
