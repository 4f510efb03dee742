//! Submission queues.

use std::fmt;

use crate::error::ExecResult;
use crate::executor::Command;
use crate::sync::{Fence, PipelineStage, Semaphore};

/// One command buffer handed to a queue.
#[derive(Debug)]
pub struct Submission<'a> {
    /// Debug label (the node's label).
    pub label: &'a str,
    /// Recorded commands.
    pub commands: &'a [Command],
    /// Semaphores to wait on, with the stage at which the wait happens.
    pub wait: Vec<(&'a Semaphore, PipelineStage)>,
    /// Semaphores to signal once the commands retire.
    pub signal: Vec<&'a Semaphore>,
    /// Fence to signal once the commands retire.
    pub fence: &'a Fence,
}

/// A hardware submission queue.
///
/// Implementations must eventually signal every semaphore in
/// [`Submission::signal`] and then the [`Submission::fence`].
pub trait SubmitQueue: Send + Sync + fmt::Debug {
    fn submit(&self, submission: Submission<'_>) -> ExecResult<()>;
}
