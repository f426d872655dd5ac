//! Calibration manager: point set, reference samples, matrix and tiered correction
//!
//! The manager is the single owner of calibration state. Runtime correction
//! always produces an RGB estimate, falling through three tiers:
//!
//! 1. **Matrix**: fitted matrix is valid and enough points exist
//! 2. **TwoPoint**: Black and White points exist; per-channel linear map
//! 3. **Uncalibrated**: raw value divided by 256
//!
//! Mutations are synchronous and not reentrant; callers sharing a manager
//! across contexts must serialize access themselves.

use super::auto::AutoCalibration;
use super::matrix::{uncalibrated, ColorCorrectionMatrix, CompensationLevel, ReferenceSamples};
use super::point::{CalibrationColor, CalibrationPoint, DarkOffsetPoint, PointSet, RawXyz};
use super::solver::MatrixSolver;
use crate::config::CalibrationConfig;
use crate::constants::sensor;
use crate::error::{CalibrationError, Result};
use crate::persistence::{self, PersistedState};
use crate::ports::{KeyValueStore, SensorSettings};
use crate::Correction;
use log::{debug, info, warn};
use palette::Srgb;
use serde::{Deserialize, Serialize};

/// Correction strategy in use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionTier {
    /// Least-squares matrix with reference compensation
    Matrix,
    /// Linear interpolation between the Black and White points
    TwoPoint,
    /// Raw counts divided by 256
    Uncalibrated,
}

/// Snapshot of which reference colors have been captured
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CalibrationStatus {
    pub black: bool,
    pub white: bool,
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub yellow: bool,
    pub total_points: usize,
    /// Captured share of the six reference colors, 0-100
    pub progress: u8,
    /// Black and White are both present
    pub complete: bool,
    pub matrix_valid: bool,
}

impl CalibrationStatus {
    pub fn has(&self, color: CalibrationColor) -> bool {
        match color {
            CalibrationColor::Black => self.black,
            CalibrationColor::White => self.white,
            CalibrationColor::Red => self.red,
            CalibrationColor::Green => self.green,
            CalibrationColor::Blue => self.blue,
            CalibrationColor::Yellow => self.yellow,
        }
    }
}

/// Owner of all calibration state
pub struct CalibrationManager<S: KeyValueStore> {
    store: S,
    config: CalibrationConfig,
    solver: MatrixSolver,
    initialized: bool,
    points: PointSet,
    matrix: ColorCorrectionMatrix,
    dark_offset: Option<DarkOffsetPoint>,
    sensor_settings: Option<SensorSettings>,
    black_reference: Option<CalibrationPoint>,
    last_error: Option<String>,
    pub(super) auto: AutoCalibration,
}

impl<S: KeyValueStore> CalibrationManager<S> {
    /// Create an uninitialized manager; call [`initialize`](Self::initialize) before use
    pub fn new(store: S, config: CalibrationConfig) -> Self {
        Self {
            store,
            solver: MatrixSolver::new(config.solver.clone()),
            config,
            initialized: false,
            points: PointSet::new(),
            matrix: ColorCorrectionMatrix::default(),
            dark_offset: None,
            sensor_settings: None,
            black_reference: None,
            last_error: None,
            auto: AutoCalibration::default(),
        }
    }

    /// Restore persisted state and fit the matrix
    ///
    /// A storage failure is logged and leaves the manager empty but usable.
    pub fn initialize(&mut self) {
        if let Err(e) = self.load() {
            warn!("Starting without persisted calibration: {}", e);
        }
        self.initialized = true;
        self.recalculate_matrix();
        info!(
            "Calibration manager ready: {} points, tier {:?}",
            self.points.len(),
            self.active_tier()
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Record the gain and integration time the sensor is running at
    ///
    /// Dark offsets captured by the guided sequence are tagged with these
    /// settings.
    pub fn set_sensor_settings(&mut self, settings: SensorSettings) {
        self.sensor_settings = Some(settings);
    }

    pub fn sensor_settings(&self) -> Option<SensorSettings> {
        self.sensor_settings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the manager, returning its store
    pub fn into_store(self) -> S {
        self.store
    }

    // =========================================================================
    // Runtime correction
    // =========================================================================

    /// Convert a raw reading to RGB using the best available tier
    ///
    /// Never fails. Before initialization the result is black with
    /// `calibrated == false`; an all-zero reading is black on every tier.
    pub fn correct(&self, raw: RawXyz) -> Correction {
        if !self.initialized {
            return Correction::new(Srgb::new(0, 0, 0), CorrectionTier::Uncalibrated, false);
        }

        let tier = self.active_tier();
        if raw.is_zero() {
            return Correction::new(Srgb::new(0, 0, 0), tier, true);
        }
        if raw.max_channel() >= sensor::SAFE_CEILING {
            debug!("Reading {} at sensor ceiling, clamping", raw);
        }
        let raw = raw.clamped(sensor::SAFE_CEILING);

        match tier {
            CorrectionTier::Matrix => {
                let output = self.matrix.apply(
                    raw,
                    CompensationLevel::Auto,
                    &self.reference_samples(),
                    &self.config.correction,
                );
                Correction::new(output.rgb, tier, output.ok)
            }
            CorrectionTier::TwoPoint => match self.two_point(raw) {
                Some(rgb) => Correction::new(rgb, tier, true),
                None => Correction::new(uncalibrated(raw), CorrectionTier::Uncalibrated, false),
            },
            CorrectionTier::Uncalibrated => Correction::new(uncalibrated(raw), tier, false),
        }
    }

    /// Tier [`correct`](Self::correct) would use right now
    pub fn active_tier(&self) -> CorrectionTier {
        if self.is_matrix_calibrated() {
            CorrectionTier::Matrix
        } else if self.is_two_point_calibrated() {
            CorrectionTier::TwoPoint
        } else {
            CorrectionTier::Uncalibrated
        }
    }

    /// Valid matrix backed by enough points
    pub fn is_matrix_calibrated(&self) -> bool {
        self.matrix.valid && self.points.len() >= self.config.correction.min_matrix_points
    }

    /// Black and White points are both present
    pub fn is_two_point_calibrated(&self) -> bool {
        self.points.contains(CalibrationColor::Black) && self.points.contains(CalibrationColor::White)
    }

    pub fn is_matrix_valid(&self) -> bool {
        self.matrix.valid
    }

    /// Per-channel integer map from the Black→White raw range onto their targets
    fn two_point(&self, raw: RawXyz) -> Option<Srgb<u8>> {
        let black = self.points.get(CalibrationColor::Black)?;
        let white = self.points.get(CalibrationColor::White)?;

        let (lo, hi, input) = (black.raw.channels(), white.raw.channels(), raw.channels());
        let channel = |c: usize| {
            let (in_min, in_max) = (lo[c] as i64, hi[c] as i64);
            let (out_min, out_max) = (black.target[c] as i64, white.target[c] as i64);
            if in_max == in_min {
                return out_min as u8;
            }
            let mapped = (input[c] as i64 - in_min) * (out_max - out_min) / (in_max - in_min) + out_min;
            mapped.clamp(0, 255) as u8
        };
        Some(Srgb::new(channel(0), channel(1), channel(2)))
    }

    fn reference_samples(&self) -> ReferenceSamples {
        ReferenceSamples {
            dark_offset: self.dark_offset.map(|d| d.raw()),
            black_reference: self.black_reference.map(|b| b.raw),
        }
    }

    // =========================================================================
    // Point management
    // =========================================================================

    /// Store a reading for the named reference color
    ///
    /// `color_name` accepts internal or display names, case-insensitively.
    /// Succeeds once the input guards pass, even if the matrix cannot be
    /// fitted yet; see [`last_error`](Self::last_error) for solver failures.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `UnknownColor`, `ZeroReading` or `InvalidQuality`.
    pub fn upsert(&mut self, color_name: &str, raw: RawXyz, quality: f32) -> Result<()> {
        self.ensure_initialized()?;
        let color = match color_name.parse::<CalibrationColor>() {
            Ok(color) => color,
            Err(e) => return self.fail(e),
        };
        self.upsert_color(color, raw, quality)
    }

    /// Store a reading for `color`
    pub fn upsert_color(&mut self, color: CalibrationColor, raw: RawXyz, quality: f32) -> Result<()> {
        self.ensure_initialized()?;
        if raw.is_zero() {
            return self.fail(CalibrationError::ZeroReading);
        }
        if !(0.0..=1.0).contains(&quality) {
            return self.fail(CalibrationError::InvalidQuality { quality });
        }
        if raw.max_channel() >= sensor::SATURATION_WARNING {
            warn!(
                "{} reading {} is near saturation; consider lowering gain or illumination",
                color, raw
            );
        }

        let replaced = self
            .points
            .insert(color, CalibrationPoint::new(raw, color.target(), quality));
        info!(
            "{} {} calibration point: {}",
            if replaced.is_some() { "Updated" } else { "Added" },
            color,
            raw
        );

        self.recalculate_matrix();
        self.persist();
        Ok(())
    }

    /// Store an illumination-off sample
    pub fn calibrate_dark_offset(&mut self, raw: RawXyz, settings: Option<SensorSettings>) -> Result<()> {
        self.ensure_initialized()?;
        self.dark_offset = Some(DarkOffsetPoint::new(raw, settings));
        info!("Dark offset stored: {}", raw);
        self.persist();
        Ok(())
    }

    /// Store an illumination-on black sample; also upserts the Black point
    pub fn calibrate_black_reference(&mut self, raw: RawXyz) -> Result<()> {
        self.ensure_initialized()?;
        if raw.is_zero() {
            return self.fail(CalibrationError::ZeroReading);
        }
        self.black_reference = Some(CalibrationPoint::new(
            raw,
            CalibrationColor::Black.target(),
            1.0,
        ));
        info!("Black reference stored: {}", raw);
        self.upsert_color(CalibrationColor::Black, raw, 1.0)
    }

    /// Forget the dark offset, e.g. after gain or integration time changed
    ///
    /// Professional compensation degrades to BlackOnly until it is re-captured.
    pub fn invalidate_dark_offset(&mut self) {
        if self.dark_offset.take().is_some() {
            info!("Dark offset invalidated");
            self.persist();
        }
    }

    /// Fit the matrix from the current points
    ///
    /// Returns whether the matrix is valid afterwards. Below the point
    /// threshold this is a no-op; a solver failure invalidates the matrix
    /// and is recorded in [`last_error`](Self::last_error).
    pub fn recalculate_matrix(&mut self) -> bool {
        let needed = self.config.correction.min_matrix_points;
        if self.points.len() < needed {
            debug!(
                "{} of {} points captured, matrix fit deferred",
                self.points.len(),
                needed
            );
            return self.matrix.valid;
        }

        match self.solver.solve(&self.points.to_vec()) {
            Ok(matrix) => {
                self.matrix = matrix;
                self.last_error = None;
                true
            }
            Err(e) => {
                self.matrix.invalidate();
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Which colors are captured and whether the matrix is usable
    pub fn status(&self) -> CalibrationStatus {
        let total_points = self.points.len();
        let has = |color| self.points.contains(color);
        CalibrationStatus {
            black: has(CalibrationColor::Black),
            white: has(CalibrationColor::White),
            red: has(CalibrationColor::Red),
            green: has(CalibrationColor::Green),
            blue: has(CalibrationColor::Blue),
            yellow: has(CalibrationColor::Yellow),
            total_points,
            progress: (total_points * 100 / CalibrationColor::ALL.len()) as u8,
            complete: self.is_two_point_calibrated(),
            matrix_valid: self.matrix.valid,
        }
    }

    /// Discard all calibration, in memory and in the store
    ///
    /// In-memory state is cleared even if the store cannot be.
    pub fn reset(&mut self) -> Result<()> {
        self.points.clear();
        self.matrix = ColorCorrectionMatrix::default();
        self.dark_offset = None;
        self.black_reference = None;
        self.last_error = None;
        self.auto = AutoCalibration::default();
        info!("Calibration reset");

        if let Err(e) = self.store.clear() {
            warn!("Failed to clear persisted calibration: {}", e);
            return self.fail(e.into());
        }
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn matrix(&self) -> &ColorCorrectionMatrix {
        &self.matrix
    }

    pub fn dark_offset(&self) -> Option<&DarkOffsetPoint> {
        self.dark_offset.as_ref()
    }

    pub fn black_reference(&self) -> Option<&CalibrationPoint> {
        self.black_reference.as_ref()
    }

    /// Most recent failure description, including solver failures `upsert` absorbed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write points and reference samples to the store
    pub fn save(&mut self) -> Result<()> {
        let state = PersistedState {
            points: self.points.to_vec(),
            dark_offset: self.dark_offset,
            black_reference: self.black_reference,
        };
        persistence::save(&mut self.store, &state).map_err(CalibrationError::from)
    }

    /// Replace in-memory state with the store's contents
    ///
    /// The matrix is not refitted here; call
    /// [`recalculate_matrix`](Self::recalculate_matrix) afterwards.
    pub fn load(&mut self) -> Result<()> {
        let state = persistence::load(&self.store)?;

        self.points.clear();
        for point in state.points {
            if let Some(color) = point.color() {
                self.points.insert(color, point);
            }
        }
        self.dark_offset = state.dark_offset;
        self.black_reference = state.black_reference;
        self.matrix = ColorCorrectionMatrix::default();
        debug!("Loaded {} calibration points", self.points.len());
        Ok(())
    }

    /// Save, keeping in-memory state authoritative on failure
    fn persist(&mut self) {
        if let Err(e) = self.save() {
            warn!("Failed to persist calibration: {}", e);
            self.last_error = Some(e.to_string());
        }
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            self.fail(CalibrationError::NotInitialized)
        }
    }

    /// Record `err` as the last error and return it
    pub(super) fn fail<T>(&mut self, err: CalibrationError) -> Result<T> {
        self.last_error = Some(err.to_string());
        Err(err)
    }
}
