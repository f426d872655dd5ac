//! Adapters implementing the ports
//!
//! - [`MemoryStore`] and [`JsonFileStore`] implement [`crate::ports::KeyValueStore`]
//! - [`mock`] provides scripted sensor and illumination doubles for tests
//!   and hosts without hardware

pub mod json_store;
pub mod memory_store;
pub mod mock;

pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;
pub use mock::{MockIllumination, MockSensor};
