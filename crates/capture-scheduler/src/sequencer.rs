//! Registration instruction sequence

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::SchedulerError;

/// A single pose/expression prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionStep {
    /// Prompt shown to the user
    pub text: String,
    /// How long the prompt is shown before the shutter may fire
    pub duration_ms: u64,
}

impl InstructionStep {
    pub fn new(text: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            text: text.into(),
            duration_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Ordered, cyclically indexed prompt list (shared, read-only)
#[derive(Debug, Clone)]
pub struct InstructionSequencer {
    steps: Arc<[InstructionStep]>,
}

impl InstructionSequencer {
    /// Build a sequencer from a non-empty prompt list
    pub fn new(steps: Vec<InstructionStep>) -> Result<Self, SchedulerError> {
        if steps.is_empty() {
            return Err(SchedulerError::EmptyInstructions);
        }
        Ok(Self {
            steps: steps.into(),
        })
    }

    /// Prompt for capture `step_index`, wrapping past the end of the list
    pub fn next(&self, step_index: usize) -> &InstructionStep {
        &self.steps[step_index % self.steps.len()]
    }

    /// Number of distinct prompts
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; construction rejects empty lists
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All prompts in order
    pub fn steps(&self) -> &[InstructionStep] {
        &self.steps
    }
}

impl Default for InstructionSequencer {
    fn default() -> Self {
        let steps = vec![
            InstructionStep::new("Look straight at the camera", 2000),
            InstructionStep::new("Turn your head slightly to the left", 1500),
            InstructionStep::new("Turn your head slightly to the right", 1500),
            InstructionStep::new("Tilt your head up a little", 1500),
            InstructionStep::new("Tilt your head down a little", 1500),
            InstructionStep::new("Smile naturally", 1500),
            InstructionStep::new("Keep a neutral expression", 1500),
            InstructionStep::new("Move a little closer to the camera", 2000),
            InstructionStep::new("Move a little further from the camera", 2000),
            InstructionStep::new("Look straight again and hold still", 2000),
        ];
        Self {
            steps: steps.into(),
        }
    }
}
