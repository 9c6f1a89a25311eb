//! Strictly ordered execution of async startup steps.
//!
//! The sequencer knows nothing about subsystems: it runs whatever steps it is
//! given over a caller-owned context, stops at the first failure and tags the
//! error with the failing step's position. A sequencer runs at most once.

use async_trait::async_trait;
use sandbox_core::{Result, SandboxError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One named unit of startup work.
#[async_trait]
pub trait Step<C: Send>: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &mut C) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    NotStarted,
    Running(usize),
    Succeeded,
    Failed(usize),
}

pub struct StepSequencer<C: Send> {
    steps: Vec<Box<dyn Step<C>>>,
    state: SequencerState,
    cancel: Option<CancellationToken>,
}

impl<C: Send> StepSequencer<C> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            state: SequencerState::NotStarted,
            cancel: None,
        }
    }

    pub fn step(mut self, step: impl Step<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn Step<C>>) {
        self.steps.push(step);
    }

    /// Check `token` before every step.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Run every step against an owned context and hand it back.
    pub async fn run(&mut self, mut ctx: C) -> Result<C> {
        self.run_with(&mut ctx).await?;
        Ok(ctx)
    }

    /// Run every step against a borrowed context. The context keeps whatever
    /// the steps before a failure left in it.
    ///
    /// Fails with [`SandboxError::SequenceAlreadyRun`] unless the sequencer is
    /// still [`SequencerState::NotStarted`].
    pub async fn run_with(&mut self, ctx: &mut C) -> Result<()> {
        if self.state != SequencerState::NotStarted {
            return Err(SandboxError::SequenceAlreadyRun);
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(token) = &self.cancel {
                if token.is_cancelled() {
                    self.state = SequencerState::Failed(index);
                    warn!(step = step.name(), index, "Startup cancelled");
                    return Err(SandboxError::Cancelled {
                        before_step: step.name().to_string(),
                    });
                }
            }

            self.state = SequencerState::Running(index);
            debug!(step = step.name(), index, "Running startup step");

            if let Err(e) = step.run(ctx).await {
                self.state = SequencerState::Failed(index);
                debug!(step = step.name(), index, error = %e, "Startup step failed");
                return Err(e.at_step(index, step.name()));
            }
        }

        self.state = SequencerState::Succeeded;
        debug!(steps = self.steps.len(), "All startup steps completed");
        Ok(())
    }
}

impl<C: Send> Default for StepSequencer<C> {
    fn default() -> Self {
        Self::new()
    }
}
