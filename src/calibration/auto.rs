//! Guided auto-calibration sequence
//!
//! ```text
//! Idle ──start──▶ InProgress ──next/skip past Yellow──▶ Completed
//!                    │  └──cancel──▶ Cancelled
//!                    ▼
//!   Black(AwaitingDarkOffset) ─▶ Black(AwaitingBlackReference)
//!     ─▶ White ─▶ Red ─▶ Green ─▶ Blue ─▶ Yellow
//! ```
//!
//! Black takes two captures: a dark offset with illumination forced off,
//! then a black reference with illumination on. A failed capture leaves the
//! machine on the same step with failure instructions. Whenever the sequence
//! ends, illumination left at zero is restored to the configured default.

use super::manager::CalibrationManager;
use super::point::{CalibrationColor, RawXyz};
use crate::error::{CalibrationError, Result};
use crate::ports::{IlluminationControl, KeyValueStore, SensorReader, SensorSettings};
use log::{info, warn};
use serde::{Deserialize, Serialize};

const STAGE_1_INSTRUCTIONS: &str = "STAGE 1: Cover sensor completely to block all light. LED will turn OFF automatically for dark offset measurement.";
const STAGE_1_FAILED: &str = "STAGE 1 FAILED: Please cover sensor completely and try again.";
const STAGE_2_INSTRUCTIONS: &str =
    "STAGE 2: Place BLACK sample over sensor. LED is now ON for black reference measurement.";
const STAGE_2_FAILED: &str = "STAGE 2 FAILED: Please place BLACK sample over sensor and try again.";
const COMPLETED: &str = "Auto-calibration completed successfully!";
const CANCELLED: &str = "Auto-calibration cancelled.";

/// Lifecycle of the guided sequence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoCalibrationState {
    #[default]
    Idle,
    InProgress,
    Completed,
    Cancelled,
}

/// Sub-stage of the two-capture Black step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackStage {
    AwaitingDarkOffset,
    AwaitingBlackReference,
}

/// Capture the sequence is waiting on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureStep {
    Black(BlackStage),
    Color(CalibrationColor),
}

impl CaptureStep {
    const FIRST: CaptureStep = CaptureStep::Black(BlackStage::AwaitingDarkOffset);

    pub fn color(self) -> CalibrationColor {
        match self {
            CaptureStep::Black(_) => CalibrationColor::Black,
            CaptureStep::Color(color) => color,
        }
    }

    pub fn black_stage(self) -> Option<BlackStage> {
        match self {
            CaptureStep::Black(stage) => Some(stage),
            CaptureStep::Color(_) => None,
        }
    }

    /// Following step, or `None` after the last color
    fn next(self) -> Option<CaptureStep> {
        match self {
            CaptureStep::Black(BlackStage::AwaitingDarkOffset) => {
                Some(CaptureStep::Black(BlackStage::AwaitingBlackReference))
            }
            CaptureStep::Black(BlackStage::AwaitingBlackReference) => {
                CalibrationColor::Black.next().map(CaptureStep::Color)
            }
            CaptureStep::Color(color) => color.next().map(CaptureStep::Color),
        }
    }

    fn instructions(self) -> String {
        match self {
            CaptureStep::Black(BlackStage::AwaitingDarkOffset) => STAGE_1_INSTRUCTIONS.to_string(),
            CaptureStep::Black(BlackStage::AwaitingBlackReference) => STAGE_2_INSTRUCTIONS.to_string(),
            CaptureStep::Color(color) => {
                format!("Place {} sample over sensor and click Next", color.display_name())
            }
        }
    }
}

/// Read-only view of the sequence for the API layer
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AutoCalibrationStatus {
    pub state: AutoCalibrationState,
    /// Color being captured; `None` outside `InProgress`
    pub color: Option<CalibrationColor>,
    pub color_name: Option<&'static str>,
    pub target: Option<[u8; 3]>,
    /// 1-based position in the six-color sequence; 0 when idle or cancelled
    pub current_step: usize,
    pub total_steps: usize,
    /// Completed share of the sequence, 0-100
    pub progress: u8,
    pub instructions: String,
    pub can_skip: bool,
    pub black_stage: Option<BlackStage>,
}

#[derive(Clone, Debug)]
pub(super) struct AutoCalibration {
    state: AutoCalibrationState,
    step: CaptureStep,
    instructions: String,
}

impl Default for AutoCalibration {
    fn default() -> Self {
        Self {
            state: AutoCalibrationState::Idle,
            step: CaptureStep::FIRST,
            instructions: String::new(),
        }
    }
}

impl AutoCalibration {
    fn status(&self) -> AutoCalibrationStatus {
        let total_steps = CalibrationColor::ALL.len();
        let (color, current_step, progress) = match self.state {
            AutoCalibrationState::InProgress => {
                let index = self.step.color().index();
                (Some(self.step.color()), index + 1, (index * 100 / total_steps) as u8)
            }
            AutoCalibrationState::Completed => (None, total_steps, 100),
            AutoCalibrationState::Idle | AutoCalibrationState::Cancelled => (None, 0, 0),
        };

        AutoCalibrationStatus {
            state: self.state,
            color,
            color_name: color.map(CalibrationColor::display_name),
            target: color.map(CalibrationColor::target),
            current_step,
            total_steps,
            progress,
            instructions: self.instructions.clone(),
            can_skip: color.is_some_and(CalibrationColor::can_skip),
            black_stage: color.and(self.step.black_stage()),
        }
    }
}

/// Take a reading with illumination off, restoring the previous level afterwards
///
/// The level is restored on every path once it has been turned off.
pub(crate) fn measure_dark<R, L>(sensor: &mut R, light: &mut L) -> Result<RawXyz>
where
    R: SensorReader + ?Sized,
    L: IlluminationControl + ?Sized,
{
    let original = light.brightness();
    light.set_brightness(0)?;
    light.wait_stable();

    let reading = sensor.read_averaged();

    let restored = light.set_brightness(original);
    light.wait_stable();

    let raw = reading?;
    restored?;
    Ok(raw)
}

impl<S: KeyValueStore> CalibrationManager<S> {
    /// Begin the sequence at Black, dark-offset stage
    ///
    /// Restarting while a sequence is running starts over.
    pub fn start_auto_calibration(&mut self) -> Result<AutoCalibrationStatus> {
        if !self.is_initialized() {
            return self.fail(CalibrationError::NotInitialized);
        }
        self.auto = AutoCalibration {
            state: AutoCalibrationState::InProgress,
            step: CaptureStep::FIRST,
            instructions: CaptureStep::FIRST.instructions(),
        };
        info!("Auto-calibration started");
        Ok(self.auto.status())
    }

    pub fn auto_calibration_status(&self) -> AutoCalibrationStatus {
        self.auto.status()
    }

    /// Capture the current step and advance
    ///
    /// # Errors
    ///
    /// `AutoCalibrationInactive` outside `InProgress`. `StageFailed` if the
    /// capture failed; the step is unchanged and the instructions explain
    /// what to fix.
    pub fn next_auto_calibration_step<R, L>(
        &mut self,
        sensor: &mut R,
        light: &mut L,
    ) -> Result<AutoCalibrationStatus>
    where
        R: SensorReader + ?Sized,
        L: IlluminationControl + ?Sized,
    {
        self.ensure_in_progress()?;

        let step = self.auto.step;
        let settings = self.sensor_settings();
        let captured = match step {
            CaptureStep::Black(BlackStage::AwaitingDarkOffset) => measure_dark(sensor, light)
                .and_then(|raw| self.calibrate_dark_offset(raw, settings)),
            CaptureStep::Black(BlackStage::AwaitingBlackReference) => {
                self.ensure_illuminated(light)
                    .and_then(|_| sensor.read_averaged().map_err(CalibrationError::from))
                    .and_then(|raw| self.calibrate_black_reference(raw))
            }
            CaptureStep::Color(color) => sensor
                .read_averaged()
                .map_err(CalibrationError::from)
                .and_then(|raw| self.upsert_color(color, raw, 1.0)),
        };

        if let Err(e) = captured {
            let (stage, instructions) = match step {
                CaptureStep::Black(BlackStage::AwaitingDarkOffset) => {
                    ("Dark offset capture", STAGE_1_FAILED.to_string())
                }
                CaptureStep::Black(BlackStage::AwaitingBlackReference) => {
                    ("Black reference capture", STAGE_2_FAILED.to_string())
                }
                CaptureStep::Color(color) => (
                    "Color capture",
                    format!(
                        "{} capture failed: place {} sample over sensor and try again.",
                        color.display_name(),
                        color.display_name()
                    ),
                ),
            };
            warn!("{} failed: {}", stage, e);
            self.auto.instructions = instructions;
            return self.fail(CalibrationError::StageFailed {
                stage,
                reason: e.to_string(),
            });
        }

        info!("Auto-calibration step {:?} captured", step);
        self.advance(light)
    }

    /// Re-issue the current step's instructions
    pub fn retry_auto_calibration_step(&mut self) -> Result<AutoCalibrationStatus> {
        self.ensure_in_progress()?;
        self.auto.instructions = match self.auto.step {
            CaptureStep::Color(color) => format!(
                "Retry: Place {} sample over sensor and click Next",
                color.display_name()
            ),
            black => black.instructions(),
        };
        Ok(self.auto.status())
    }

    /// Advance past an optional color without capturing it
    ///
    /// # Errors
    ///
    /// `StepNotSkippable` for Black and White; the state is unchanged.
    pub fn skip_auto_calibration_step<L>(&mut self, light: &mut L) -> Result<AutoCalibrationStatus>
    where
        L: IlluminationControl + ?Sized,
    {
        self.ensure_in_progress()?;
        let color = self.auto.step.color();
        if !color.can_skip() {
            return self.fail(CalibrationError::StepNotSkippable {
                color: color.display_name(),
            });
        }
        info!("Skipping {}", color);
        self.advance(light)
    }

    /// Finish the sequence now, keeping whatever was captured
    pub fn complete_auto_calibration<L>(&mut self, light: &mut L) -> Result<AutoCalibrationStatus>
    where
        L: IlluminationControl + ?Sized,
    {
        self.auto.state = AutoCalibrationState::Completed;
        self.auto.instructions = COMPLETED.to_string();
        self.restore_illumination(light);
        info!("Auto-calibration completed");
        Ok(self.auto.status())
    }

    /// Abandon a running sequence
    pub fn cancel_auto_calibration<L>(&mut self, light: &mut L) -> Result<AutoCalibrationStatus>
    where
        L: IlluminationControl + ?Sized,
    {
        self.ensure_in_progress()?;
        self.auto.state = AutoCalibrationState::Cancelled;
        self.auto.instructions = CANCELLED.to_string();
        self.restore_illumination(light);
        info!("Auto-calibration cancelled");
        Ok(self.auto.status())
    }

    /// Re-capture the dark offset if it is missing or was taken under other settings
    ///
    /// Returns whether a capture happened.
    pub fn recalibrate_dark_offset_if_needed<R, L>(
        &mut self,
        settings: SensorSettings,
        sensor: &mut R,
        light: &mut L,
    ) -> Result<bool>
    where
        R: SensorReader + ?Sized,
        L: IlluminationControl + ?Sized,
    {
        if self
            .dark_offset()
            .is_some_and(|dark| dark.settings == Some(settings))
        {
            return Ok(false);
        }

        info!(
            "Re-capturing dark offset for gain {} / {} ms",
            settings.gain, settings.integration_time_ms
        );
        let raw = match measure_dark(sensor, light) {
            Ok(raw) => raw,
            Err(e) => return self.fail(e),
        };
        self.set_sensor_settings(settings);
        self.calibrate_dark_offset(raw, Some(settings))?;
        Ok(true)
    }

    fn advance<L>(&mut self, light: &mut L) -> Result<AutoCalibrationStatus>
    where
        L: IlluminationControl + ?Sized,
    {
        match self.auto.step.next() {
            Some(step) => {
                self.auto.step = step;
                self.auto.instructions = step.instructions();
                Ok(self.auto.status())
            }
            None => self.complete_auto_calibration(light),
        }
    }

    fn ensure_in_progress(&mut self) -> Result<()> {
        if self.auto.state == AutoCalibrationState::InProgress {
            Ok(())
        } else {
            self.fail(CalibrationError::AutoCalibrationInactive)
        }
    }

    /// Stage 2 needs the LED on even if it was off before stage 1
    fn ensure_illuminated<L>(&self, light: &mut L) -> Result<()>
    where
        L: IlluminationControl + ?Sized,
    {
        if light.brightness() == 0 {
            light.set_brightness(self.config().auto_calibration.default_brightness)?;
            light.wait_stable();
        }
        Ok(())
    }

    fn restore_illumination<L>(&self, light: &mut L)
    where
        L: IlluminationControl + ?Sized,
    {
        if light.brightness() != 0 {
            return;
        }
        let level = self.config().auto_calibration.default_brightness;
        match light.set_brightness(level) {
            Ok(()) => info!("Illumination restored to {}", level),
            Err(e) => warn!("Failed to restore illumination: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, MockIllumination, MockSensor};
    use crate::config::CalibrationConfig;
    use crate::ports::SensorError;

    fn manager() -> CalibrationManager<MemoryStore> {
        let mut manager = CalibrationManager::new(MemoryStore::new(), CalibrationConfig::default());
        manager.initialize();
        manager
    }

    #[test]
    fn test_idle_by_default() {
        let status = manager().auto_calibration_status();
        assert_eq!(status.state, AutoCalibrationState::Idle);
        assert_eq!(status.current_step, 0);
        assert!(status.color.is_none());
    }

    #[test]
    fn test_start_awaits_dark_offset() {
        let mut manager = manager();
        let status = manager.start_auto_calibration().unwrap();

        assert_eq!(status.state, AutoCalibrationState::InProgress);
        assert_eq!(status.current_step, 1);
        assert_eq!(status.total_steps, 6);
        assert_eq!(status.progress, 0);
        assert_eq!(status.color, Some(CalibrationColor::Black));
        assert_eq!(status.black_stage, Some(BlackStage::AwaitingDarkOffset));
        assert!(!status.can_skip);
        assert!(status.instructions.starts_with("STAGE 1"));
    }

    #[test]
    fn test_dark_stage_turns_light_off_and_restores() {
        let mut manager = manager();
        let mut sensor = MockSensor::new(vec![RawXyz::new(12, 15, 11)]);
        let mut light = MockIllumination::new(180);

        manager.start_auto_calibration().unwrap();
        let status = manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap();

        assert_eq!(light.history(), &[0, 180]);
        assert_eq!(status.black_stage, Some(BlackStage::AwaitingBlackReference));
        assert_eq!(status.current_step, 1);
        assert_eq!(manager.dark_offset().unwrap().raw(), RawXyz::new(12, 15, 11));
    }

    #[test]
    fn test_dark_stage_failure_restores_light_and_stays() {
        let mut manager = manager();
        let mut sensor = MockSensor::new(Vec::new());
        sensor.push_failure(SensorError::Timeout);
        let mut light = MockIllumination::new(90);

        manager.start_auto_calibration().unwrap();
        let err = manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap_err();

        assert!(matches!(err, CalibrationError::StageFailed { .. }));
        assert_eq!(light.brightness(), 90);
        let status = manager.auto_calibration_status();
        assert_eq!(status.black_stage, Some(BlackStage::AwaitingDarkOffset));
        assert!(status.instructions.starts_with("STAGE 1 FAILED"));
        assert!(manager.last_error().is_some());
    }

    #[test]
    fn test_black_stage_turns_light_back_on() {
        let mut manager = manager();
        let mut sensor = MockSensor::new(vec![RawXyz::new(5, 5, 5), RawXyz::new(300, 310, 290)]);
        let mut light = MockIllumination::new(0);

        manager.start_auto_calibration().unwrap();
        manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap();
        let status = manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap();

        assert_eq!(light.brightness(), 128);
        assert_eq!(status.color, Some(CalibrationColor::White));
        assert!(!status.can_skip);
        assert!(status.black_stage.is_none());
        assert!(manager.black_reference().is_some());
        assert!(manager.status().black);
    }

    #[test]
    fn test_black_reference_failure_stays_on_stage_two() {
        let mut manager = manager();
        let mut sensor = MockSensor::new(vec![RawXyz::new(5, 5, 5)]);
        sensor.push_failure(SensorError::ReadFailed);
        let mut light = MockIllumination::new(128);

        manager.start_auto_calibration().unwrap();
        manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap();
        let err = manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap_err();

        assert!(matches!(
            err,
            CalibrationError::StageFailed {
                stage: "Black reference capture",
                ..
            }
        ));
        let status = manager.auto_calibration_status();
        assert_eq!(status.state, AutoCalibrationState::InProgress);
        assert_eq!(status.color, Some(CalibrationColor::Black));
        assert_eq!(status.black_stage, Some(BlackStage::AwaitingBlackReference));
        assert!(status.instructions.starts_with("STAGE 2 FAILED"));
        assert!(manager.black_reference().is_none());
        assert!(!manager.status().black);
    }

    #[test]
    fn test_color_capture_failure_stays_on_color() {
        let mut manager = manager();
        let mut sensor = MockSensor::new(vec![
            RawXyz::new(5, 5, 5),
            RawXyz::new(300, 310, 290),
            RawXyz::new(52000, 53000, 50000),
            RawXyz::default(),
        ]);
        let mut light = MockIllumination::new(128);

        manager.start_auto_calibration().unwrap();
        for _ in 0..3 {
            manager
                .next_auto_calibration_step(&mut sensor, &mut light)
                .unwrap();
        }
        assert_eq!(
            manager.auto_calibration_status().color,
            Some(CalibrationColor::Red)
        );

        let err = manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::StageFailed { .. }));

        let status = manager.auto_calibration_status();
        assert_eq!(status.color, Some(CalibrationColor::Red));
        assert_eq!(status.current_step, 3);
        assert!(status.can_skip);
        assert!(!manager.status().red);
        assert_eq!(manager.points().len(), 2);
    }

    #[test]
    fn test_guided_dark_offset_tagged_with_sensor_settings() {
        let mut manager = manager();
        let settings = SensorSettings {
            gain: 4.0,
            integration_time_ms: 100,
        };
        manager.set_sensor_settings(settings);
        let mut sensor = MockSensor::new(vec![RawXyz::new(12, 15, 11)]);
        let mut light = MockIllumination::new(128);

        manager.start_auto_calibration().unwrap();
        manager
            .next_auto_calibration_step(&mut sensor, &mut light)
            .unwrap();
        assert_eq!(manager.dark_offset().unwrap().settings, Some(settings));

        assert!(!manager
            .recalibrate_dark_offset_if_needed(settings, &mut sensor, &mut light)
            .unwrap());
        assert_eq!(sensor.read_count(), 1);
    }

    #[test]
    fn test_white_cannot_be_skipped() {
        let mut manager = manager();
        let mut sensor = MockSensor::new(vec![RawXyz::new(5, 5, 5), RawXyz::new(300, 310, 290)]);
        let mut light = MockIllumination::new(128);

        manager.start_auto_calibration().unwrap();
        manager.next_auto_calibration_step(&mut sensor, &mut light).unwrap();
        manager.next_auto_calibration_step(&mut sensor, &mut light).unwrap();

        assert_eq!(
            manager.skip_auto_calibration_step(&mut light),
            Err(CalibrationError::StepNotSkippable {
                color: "Vivid White"
            })
        );
        assert_eq!(
            manager.auto_calibration_status().color,
            Some(CalibrationColor::White)
        );
    }

    #[test]
    fn test_retry_keeps_step() {
        let mut manager = manager();
        assert_eq!(
            manager.retry_auto_calibration_step(),
            Err(CalibrationError::AutoCalibrationInactive)
        );

        manager.start_auto_calibration().unwrap();
        let status = manager.retry_auto_calibration_step().unwrap();
        assert_eq!(status.black_stage, Some(BlackStage::AwaitingDarkOffset));
        assert!(status.instructions.starts_with("STAGE 1"));
    }

    #[test]
    fn test_cancel_restores_light() {
        let mut manager = manager();
        let mut light = MockIllumination::new(0);

        manager.start_auto_calibration().unwrap();
        let status = manager.cancel_auto_calibration(&mut light).unwrap();

        assert_eq!(status.state, AutoCalibrationState::Cancelled);
        assert_eq!(light.brightness(), 128);
        assert_eq!(
            manager.cancel_auto_calibration(&mut light),
            Err(CalibrationError::AutoCalibrationInactive)
        );
    }

    #[test]
    fn test_measure_dark_restores_after_failed_read() {
        let mut sensor = MockSensor::new(Vec::new());
        let mut light = MockIllumination::new(200);

        let err = measure_dark(&mut sensor, &mut light).unwrap_err();
        assert_eq!(err, CalibrationError::Sensor(SensorError::ReadFailed));
        assert_eq!(light.history(), &[0, 200]);
        assert_eq!(light.settle_count(), 2);
    }

    #[test]
    fn test_recalibrate_dark_offset_only_when_settings_change() {
        let mut manager = manager();
        let mut sensor = MockSensor::new_repeating(RawXyz::new(20, 20, 20));
        let mut light = MockIllumination::new(128);
        let low = SensorSettings {
            gain: 1.0,
            integration_time_ms: 50,
        };
        let high = SensorSettings {
            gain: 16.0,
            integration_time_ms: 50,
        };

        assert!(manager
            .recalibrate_dark_offset_if_needed(low, &mut sensor, &mut light)
            .unwrap());
        assert!(!manager
            .recalibrate_dark_offset_if_needed(low, &mut sensor, &mut light)
            .unwrap());
        assert!(manager
            .recalibrate_dark_offset_if_needed(high, &mut sensor, &mut light)
            .unwrap());
        assert_eq!(sensor.read_count(), 2);
        assert_eq!(manager.dark_offset().unwrap().settings, Some(high));
    }
}
