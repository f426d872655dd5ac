//! Stable key schema for calibration state in a [`KeyValueStore`]
//!
//! | key              | value                                   |
//! |------------------|-----------------------------------------|
//! | `schema_version` | `1`                                     |
//! | `num_points`     | number of `point_<i>` records           |
//! | `point_<i>`      | [`CalibrationPoint`] as JSON            |
//! | `dark_offset`    | [`DarkOffsetPoint`] as JSON, if captured |
//! | `black_ref`      | [`CalibrationPoint`] as JSON, if captured |
//!
//! Loading is lenient: a malformed record, or a point whose target is not one
//! of the reference colors, is skipped with a warning.

use crate::calibration::{CalibrationColor, CalibrationPoint, DarkOffsetPoint};
use crate::ports::{KeyValueStore, StorageError};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const SCHEMA_VERSION: u32 = 1;

mod keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const NUM_POINTS: &str = "num_points";
    pub const DARK_OFFSET: &str = "dark_offset";
    pub const BLACK_REF: &str = "black_ref";

    pub fn point(index: usize) -> String {
        format!("point_{index}")
    }
}

/// Everything needed to restore calibration after a restart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub points: Vec<CalibrationPoint>,
    pub dark_offset: Option<DarkOffsetPoint>,
    pub black_reference: Option<CalibrationPoint>,
}

/// Write `state`, replacing whatever was stored before
pub fn save<S: KeyValueStore + ?Sized>(store: &mut S, state: &PersistedState) -> Result<(), StorageError> {
    let previous = stored_count(store).unwrap_or(0);

    store.put(keys::SCHEMA_VERSION, SCHEMA_VERSION.to_string())?;
    for (index, point) in state.points.iter().enumerate() {
        let key = keys::point(index);
        store.put(&key, encode(&key, point)?)?;
    }
    for stale in state.points.len()..previous {
        store.remove(&keys::point(stale))?;
    }
    store.put(keys::NUM_POINTS, state.points.len().to_string())?;

    match &state.dark_offset {
        Some(dark) => store.put(keys::DARK_OFFSET, encode(keys::DARK_OFFSET, dark)?)?,
        None => store.remove(keys::DARK_OFFSET)?,
    }
    match &state.black_reference {
        Some(black) => store.put(keys::BLACK_REF, encode(keys::BLACK_REF, black)?)?,
        None => store.remove(keys::BLACK_REF)?,
    }

    debug!("Saved {} calibration points", state.points.len());
    Ok(())
}

/// Read calibration state; an empty store yields an empty state
///
/// # Errors
///
/// Fails if the backend cannot be read, the schema version is unsupported,
/// or the point count is unreadable or larger than the number of reference
/// colors. Individual bad records are skipped.
pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Result<PersistedState, StorageError> {
    if let Some(version) = store.get(keys::SCHEMA_VERSION)? {
        let version: u32 = decode(keys::SCHEMA_VERSION, &version)?;
        if version != SCHEMA_VERSION {
            return Err(StorageError::Corrupt {
                key: keys::SCHEMA_VERSION.to_string(),
                reason: format!("unsupported schema version {version}"),
            });
        }
    }

    let count = stored_count(store)?;
    if count > CalibrationColor::ALL.len() {
        return Err(StorageError::Corrupt {
            key: keys::NUM_POINTS.to_string(),
            reason: format!(
                "{count} points stored, at most {} expected",
                CalibrationColor::ALL.len()
            ),
        });
    }
    let mut points = Vec::new();
    for index in 0..count {
        let key = keys::point(index);
        let Some(value) = store.get(&key)? else {
            warn!("Missing calibration record '{}', skipping", key);
            continue;
        };
        match decode::<CalibrationPoint>(&key, &value) {
            Ok(point) if point.color().is_some() => points.push(point),
            Ok(point) => warn!(
                "Skipping '{}': target {:?} is not a reference color",
                key, point.target
            ),
            Err(e) => warn!("Skipping unreadable record: {}", e),
        }
    }

    Ok(PersistedState {
        points,
        dark_offset: load_optional(store, keys::DARK_OFFSET)?,
        black_reference: load_optional(store, keys::BLACK_REF)?,
    })
}

fn stored_count<S: KeyValueStore + ?Sized>(store: &S) -> Result<usize, StorageError> {
    match store.get(keys::NUM_POINTS)? {
        Some(value) => decode(keys::NUM_POINTS, &value),
        None => Ok(0),
    }
}

fn load_optional<T, S>(store: &S, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    Ok(store.get(key)?.and_then(|value| match decode(key, &value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Ignoring unreadable record: {}", e);
            None
        }
    }))
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::WriteFailed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, value: &str) -> Result<T, StorageError> {
    serde_json::from_str(value).map_err(|e| StorageError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
