//! Session configuration

use attendance_ledger::ReconcilerConfig;
use capture_scheduler::{InstructionSequencer, InstructionStep, SchedulerConfig, SchedulerError};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Capture session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture timing
    pub scheduler: SchedulerConfig,
    /// Acceptance and bucketing thresholds
    pub reconciler: ReconcilerConfig,
    /// Fewest frames a registration may be submitted with (default: 3)
    pub min_registration_frames: u32,
    /// Registration prompts; the built-in list when absent
    pub instructions: Option<Vec<InstructionStep>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            reconciler: ReconcilerConfig::default(),
            min_registration_frames: 3,
            instructions: None,
        }
    }
}

impl SessionConfig {
    /// Build the instruction sequencer this config describes
    pub fn sequencer(&self) -> Result<InstructionSequencer, SchedulerError> {
        match &self.instructions {
            Some(steps) => InstructionSequencer::new(steps.clone()),
            None => Ok(InstructionSequencer::default()),
        }
    }

    /// Reject settings a session cannot run with.
    ///
    /// `min_registration_frames` must lie within `1..=target_images`, and the
    /// confidence thresholds within [0, 1] with high at or above acceptance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.sequencer()?;

        let target = self.scheduler.target_images;
        if !(1..=target).contains(&self.min_registration_frames) {
            return Err(ConfigError::MinRegistrationFrames {
                value: self.min_registration_frames,
                target,
            });
        }

        let acceptance = self.reconciler.acceptance_threshold;
        let high = self.reconciler.high_confidence_threshold;
        let in_range = |t: f64| (0.0..=1.0).contains(&t);
        if !in_range(acceptance) || !in_range(high) || high < acceptance {
            return Err(ConfigError::Thresholds { acceptance, high });
        }
        Ok(())
    }

    /// Quick timings for demos against a mock camera
    pub fn rapid() -> Self {
        Self {
            scheduler: SchedulerConfig {
                target_images: 5,
                inter_capture_interval_ms: 200,
                detection_interval_ms: 500,
            },
            instructions: Some(vec![
                InstructionStep::new("Look straight at the camera", 300),
                InstructionStep::new("Turn your head slightly", 300),
            ]),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.scheduler.target_images, 20);
        assert_eq!(config.scheduler.inter_capture_interval_ms, 2000);
        assert_eq!(config.scheduler.detection_interval_ms, 3000);
        assert_eq!(config.reconciler.acceptance_threshold, 0.6);
        assert_eq!(config.sequencer().unwrap().len(), 10);
    }

    #[test]
    fn test_empty_instruction_override_rejected() {
        let config = SessionConfig {
            instructions: Some(Vec::new()),
            ..Default::default()
        };
        assert!(config.sequencer().is_err());
    }

    #[test]
    fn test_defaults_and_rapid_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(SessionConfig::rapid().validate().is_ok());
    }

    #[test]
    fn test_min_registration_frames_bounds() {
        let mut config = SessionConfig::default();

        config.min_registration_frames = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MinRegistrationFrames { value: 0, target: 20 })
        );

        config.min_registration_frames = 21;
        assert_eq!(
            config.validate(),
            Err(ConfigError::MinRegistrationFrames { value: 21, target: 20 })
        );

        config.min_registration_frames = 20;
        assert!(config.validate().is_ok());
        config.min_registration_frames = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        let mut config = SessionConfig::default();

        config.reconciler.acceptance_threshold = 0.9;
        assert!(matches!(config.validate(), Err(ConfigError::Thresholds { .. })));

        config.reconciler = ReconcilerConfig {
            acceptance_threshold: -0.1,
            high_confidence_threshold: 0.8,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Thresholds { .. })));

        config.reconciler = ReconcilerConfig {
            acceptance_threshold: 0.6,
            high_confidence_threshold: f64::NAN,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Thresholds { .. })));
    }

    #[test]
    fn test_zero_target_is_scheduler_error() {
        let mut config = SessionConfig::default();
        config.scheduler.target_images = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Scheduler(SchedulerError::InvalidTarget(0)))
        );
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"scheduler": {"target_images": 12}}"#).unwrap();
        assert_eq!(config.scheduler.target_images, 12);
        assert_eq!(config.scheduler.detection_interval_ms, 3000);
        assert_eq!(config.min_registration_frames, 3);
    }
}
