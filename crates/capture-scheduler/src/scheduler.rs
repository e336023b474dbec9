//! Registration capture loop

use camera_capture::{CameraError, CameraLease, CapturedFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::{CancelToken, Timer, TokioTimer};
use crate::sequencer::InstructionSequencer;
use crate::SchedulerError;

/// Timing configuration for capture sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Frames requested per registration (default: 20)
    pub target_images: u32,
    /// Pause after each registration capture in milliseconds (default: 2000)
    pub inter_capture_interval_ms: u64,
    /// Minimum gap between attendance captures in milliseconds (default: 3000)
    pub detection_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_images: 20,
            inter_capture_interval_ms: 2000,
            detection_interval_ms: 3000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.target_images == 0 {
            return Err(SchedulerError::InvalidTarget(self.target_images));
        }
        Ok(())
    }

    pub fn inter_capture_interval(&self) -> Duration {
        Duration::from_millis(self.inter_capture_interval_ms)
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }
}

/// Progress notifications emitted by the registration loop
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A prompt is now displayed
    Instruction { step: u32, text: String },
    /// A frame was appended
    Captured { step: u32, captured: u32, target: u32 },
    /// The shutter failed; the step is skipped
    CaptureFailed { step: u32, reason: CameraError },
}

/// Frames accumulated by one registration loop
#[derive(Debug, Clone, Default)]
pub struct CaptureSequence {
    /// Frames in capture order
    pub frames: Vec<CapturedFrame>,
    /// Steps that were attempted
    pub requested: u32,
    /// Steps whose capture failed
    pub failed_steps: Vec<u32>,
}

impl CaptureSequence {
    fn new(requested: u32) -> Self {
        Self {
            frames: Vec::with_capacity(requested as usize),
            requested,
            failed_steps: Vec::new(),
        }
    }

    /// Frames actually captured
    pub fn successful(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Missing frames relative to the target
    pub fn short_by(&self) -> u32 {
        self.requested.saturating_sub(self.successful())
    }

    pub fn is_complete(&self) -> bool {
        self.short_by() == 0
    }
}

/// How a registration loop ended
#[derive(Debug, Clone)]
pub enum SequenceOutcome {
    /// Every step ran (some captures may have failed)
    Completed(CaptureSequence),
    /// Cancellation observed before `at_step`; buffered frames were dropped
    Cancelled { at_step: u32, discarded: usize },
}

/// Drives the multi-shot registration capture sequence
pub struct RegistrationScheduler {
    config: SchedulerConfig,
    sequencer: InstructionSequencer,
    timer: Arc<dyn Timer>,
}

impl RegistrationScheduler {
    /// Create a scheduler on the tokio clock
    pub fn new(config: SchedulerConfig, sequencer: InstructionSequencer) -> Result<Self, SchedulerError> {
        Self::with_timer(config, sequencer, Arc::new(TokioTimer))
    }

    /// Create a scheduler on a caller-supplied clock
    pub fn with_timer(
        config: SchedulerConfig,
        sequencer: InstructionSequencer,
        timer: Arc<dyn Timer>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        info!(
            "Registration scheduler created: {} images, {} prompts",
            config.target_images,
            sequencer.len()
        );
        Ok(Self {
            config,
            sequencer,
            timer,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &InstructionSequencer {
        &self.sequencer
    }

    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    /// Run the capture loop.
    ///
    /// For each step: show the prompt for its duration, fire the shutter once,
    /// then pause for the inter-capture interval. Every wait and the shutter
    /// call itself are abandoned as soon as `cancel` fires.
    pub async fn run<F>(&self, camera: &CameraLease, cancel: &CancelToken, mut on_event: F) -> SequenceOutcome
    where
        F: FnMut(SchedulerEvent),
    {
        let target = self.config.target_images;
        let mut sequence = CaptureSequence::new(target);
        info!("Starting registration capture loop ({} steps)", target);

        for step in 0..target {
            let instruction = self.sequencer.next(step as usize);
            on_event(SchedulerEvent::Instruction {
                step,
                text: instruction.text.clone(),
            });

            if cancel
                .run_until_cancelled(self.timer.sleep(instruction.duration()))
                .await
                .is_none()
            {
                return Self::cancelled(step, sequence);
            }

            match cancel.run_until_cancelled(camera.capture(step)).await {
                None => return Self::cancelled(step, sequence),
                Some(Ok(frame)) => {
                    sequence.frames.push(frame);
                    debug!("Step {}: {}/{} captured", step, sequence.successful(), target);
                    on_event(SchedulerEvent::Captured {
                        step,
                        captured: sequence.successful(),
                        target,
                    });
                }
                Some(Err(e)) => {
                    warn!("Step {} capture failed, skipping: {}", step, e);
                    sequence.failed_steps.push(step);
                    on_event(SchedulerEvent::CaptureFailed { step, reason: e });
                }
            }

            if step + 1 < target
                && cancel
                    .run_until_cancelled(self.timer.sleep(self.config.inter_capture_interval()))
                    .await
                    .is_none()
            {
                return Self::cancelled(step + 1, sequence);
            }
        }

        info!(
            "Registration capture loop finished: {}/{} frames",
            sequence.successful(),
            target
        );
        SequenceOutcome::Completed(sequence)
    }

    fn cancelled(at_step: u32, sequence: CaptureSequence) -> SequenceOutcome {
        let discarded = sequence.frames.len();
        info!("Registration cancelled at step {}, discarding {} frames", at_step, discarded);
        SequenceOutcome::Cancelled { at_step, discarded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::MockCamera;
    use tokio::time::Instant;

    fn fast_config(target: u32) -> SchedulerConfig {
        SchedulerConfig {
            target_images: target,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_target_rejected() {
        let result = RegistrationScheduler::new(fast_config(0), InstructionSequencer::default());
        assert_eq!(result.err(), Some(SchedulerError::InvalidTarget(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sequence_in_capture_order() {
        let camera = Arc::new(MockCamera::new());
        let lease = CameraLease::acquire(camera.clone()).await.unwrap();
        let scheduler = RegistrationScheduler::new(fast_config(20), InstructionSequencer::default()).unwrap();

        let mut prompts = Vec::new();
        let outcome = scheduler
            .run(&lease, &CancelToken::new(), |event| {
                if let SchedulerEvent::Instruction { text, .. } = event {
                    prompts.push(text);
                }
            })
            .await;

        let SequenceOutcome::Completed(sequence) = outcome else {
            panic!("sequence should complete");
        };
        assert_eq!(sequence.successful(), 20);
        assert!(sequence.is_complete());
        assert!(sequence
            .frames
            .windows(2)
            .all(|w| w[0].sequence_index < w[1].sequence_index && w[0].captured_at <= w[1].captured_at));
        assert_eq!(prompts.len(), 20);
        assert_eq!(prompts[15], prompts[5]);
        assert_eq!(camera.capture_count(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timing() {
        let camera = Arc::new(MockCamera::new());
        let lease = CameraLease::acquire(camera.clone()).await.unwrap();
        let sequencer = InstructionSequencer::new(vec![
            crate::InstructionStep::new("a", 500),
            crate::InstructionStep::new("b", 1000),
        ])
        .unwrap();
        let scheduler = RegistrationScheduler::new(fast_config(3), sequencer).unwrap();

        let start = Instant::now();
        scheduler.run(&lease, &CancelToken::new(), |_| {}).await;

        // 500 + 2000 + 1000 + 2000 + 500, no pause after the last capture
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(6000));
        assert!(elapsed < Duration::from_millis(6100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failures_are_skipped_not_padded() {
        let camera = Arc::new(MockCamera::new().failing_on(&[2, 7]).empty_on(&[11]));
        let lease = CameraLease::acquire(camera.clone()).await.unwrap();
        let scheduler = RegistrationScheduler::new(fast_config(20), InstructionSequencer::default()).unwrap();

        let mut failures = 0;
        let outcome = scheduler
            .run(&lease, &CancelToken::new(), |event| {
                if matches!(event, SchedulerEvent::CaptureFailed { .. }) {
                    failures += 1;
                }
            })
            .await;

        let SequenceOutcome::Completed(sequence) = outcome else {
            panic!("sequence should complete");
        };
        assert_eq!(sequence.successful(), 17);
        assert_eq!(sequence.requested, 20);
        assert_eq!(sequence.short_by(), 3);
        assert_eq!(sequence.failed_steps, vec![2, 7, 11]);
        assert_eq!(failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_sequence_stops_capturing() {
        let camera = Arc::new(MockCamera::new());
        let lease = CameraLease::acquire(camera.clone()).await.unwrap();
        let scheduler = RegistrationScheduler::new(fast_config(20), InstructionSequencer::default()).unwrap();
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        let outcome = scheduler
            .run(&lease, &cancel, |event| {
                if let SchedulerEvent::Captured { captured: 4, .. } = event {
                    trigger.cancel();
                }
            })
            .await;

        match outcome {
            SequenceOutcome::Cancelled { at_step, discarded } => {
                assert_eq!(at_step, 4);
                assert_eq!(discarded, 4);
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert_eq!(camera.capture_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start() {
        let camera = Arc::new(MockCamera::new());
        let lease = CameraLease::acquire(camera.clone()).await.unwrap();
        let scheduler = RegistrationScheduler::new(fast_config(5), InstructionSequencer::default()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = scheduler.run(&lease, &cancel, |_| {}).await;
        assert!(matches!(outcome, SequenceOutcome::Cancelled { at_step: 0, discarded: 0 }));
        assert_eq!(camera.capture_count(), 0);
    }
}
