//! Scripted hardware doubles
//!
//! [`MockSensor`] replays a queue of readings (or failures); a single
//! queued reading repeats forever. [`MockIllumination`] records every level
//! it was driven to.

use crate::calibration::RawXyz;
use crate::ports::{IlluminationControl, IlluminationError, IrChannels, SensorError, SensorReader};
use std::collections::VecDeque;

pub struct MockSensor {
    script: VecDeque<Result<RawXyz, SensorError>>,
    repeat: Option<RawXyz>,
    ir: IrChannels,
    read_count: usize,
}

impl MockSensor {
    /// Replay `readings` in order, then fail with `ReadFailed`
    pub fn new(readings: Vec<RawXyz>) -> Self {
        Self {
            script: readings.into_iter().map(Ok).collect(),
            repeat: None,
            ir: IrChannels::default(),
            read_count: 0,
        }
    }

    /// Return `reading` on every call
    pub fn new_repeating(reading: RawXyz) -> Self {
        Self {
            repeat: Some(reading),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_ir(mut self, ir: IrChannels) -> Self {
        self.ir = ir;
        self
    }

    /// Queue a reading after those already scripted
    pub fn push(&mut self, reading: RawXyz) {
        self.script.push_back(Ok(reading));
    }

    /// Queue a failure after those already scripted
    pub fn push_failure(&mut self, error: SensorError) {
        self.script.push_back(Err(error));
    }

    /// Number of read calls made so far
    pub fn read_count(&self) -> usize {
        self.read_count
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn next_reading(&mut self) -> Result<RawXyz, SensorError> {
        self.read_count += 1;
        match self.script.pop_front() {
            Some(result) => result,
            None => self.repeat.ok_or(SensorError::ReadFailed),
        }
    }
}

impl SensorReader for MockSensor {
    fn read_averaged(&mut self) -> Result<RawXyz, SensorError> {
        self.next_reading()
    }

    fn read_averaged_with_ir(&mut self) -> Result<(RawXyz, IrChannels), SensorError> {
        self.next_reading().map(|xyz| (xyz, self.ir))
    }
}

pub struct MockIllumination {
    level: u8,
    history: Vec<u8>,
    fail_levels: Vec<u8>,
    settle_count: usize,
}

impl MockIllumination {
    pub fn new(level: u8) -> Self {
        Self {
            level,
            history: Vec::new(),
            fail_levels: Vec::new(),
            settle_count: 0,
        }
    }

    /// Reject any request to set `level`
    pub fn failing_at(mut self, level: u8) -> Self {
        self.fail_levels.push(level);
        self
    }

    /// Every level successfully set, in order
    pub fn history(&self) -> &[u8] {
        &self.history
    }

    pub fn settle_count(&self) -> usize {
        self.settle_count
    }
}

impl IlluminationControl for MockIllumination {
    fn set_brightness(&mut self, level: u8) -> Result<(), IlluminationError> {
        if self.fail_levels.contains(&level) {
            return Err(IlluminationError::SetFailed { level });
        }
        self.level = level;
        self.history.push(level);
        Ok(())
    }

    fn brightness(&self) -> u8 {
        self.level
    }

    fn wait_stable(&mut self) {
        self.settle_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_replays_then_fails() {
        let mut sensor = MockSensor::new(vec![RawXyz::new(1, 2, 3)]);
        sensor.push_failure(SensorError::Timeout);
        sensor.push(RawXyz::new(4, 5, 6));
        assert_eq!(sensor.remaining(), 3);

        assert_eq!(sensor.read_averaged(), Ok(RawXyz::new(1, 2, 3)));
        assert_eq!(sensor.read_averaged(), Err(SensorError::Timeout));
        assert_eq!(sensor.read_averaged(), Ok(RawXyz::new(4, 5, 6)));
        assert_eq!(sensor.read_averaged(), Err(SensorError::ReadFailed));
        assert_eq!(sensor.read_count(), 4);
    }

    #[test]
    fn test_repeating_sensor_reports_ir() {
        let ir = IrChannels { ir1: 7, ir2: 9 };
        let mut sensor = MockSensor::new_repeating(RawXyz::new(5, 5, 5)).with_ir(ir);
        for _ in 0..3 {
            assert_eq!(sensor.read_averaged_with_ir(), Ok((RawXyz::new(5, 5, 5), ir)));
        }
    }

    #[test]
    fn test_illumination_records_levels() {
        let mut light = MockIllumination::new(200).failing_at(17);
        light.set_brightness(0).unwrap();
        light.set_brightness(200).unwrap();
        assert!(light.set_brightness(17).is_err());

        assert_eq!(light.history(), &[0, 200]);
        assert_eq!(light.brightness(), 200);
    }
}
