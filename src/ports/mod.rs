//! Ports (interfaces) defining the boundaries of the calibration engine
//!
//! The engine never touches hardware or flash directly. Everything outside
//! the core is reached through one of these traits:
//!
//! - **SensorReader**: averaged tristimulus (and IR) samples
//! - **IlluminationControl**: the sample LED's brightness
//! - **KeyValueStore**: persisted calibration state

pub mod illumination;
pub mod sensor;
pub mod storage;

pub use illumination::{IlluminationControl, IlluminationError};
pub use sensor::{IrChannels, SensorError, SensorReader, SensorSettings};
pub use storage::{KeyValueStore, StorageError};
