//! Execution runtime.
//!
//! The [`Executor`] distributes an already sorted node sequence over a fixed
//! pool of [`ExecUnit`]s. Each unit pairs one command-recording target with a
//! submission queue and a fence; a unit is reused only after its fence reports
//! that the previous submission retired.
//!
//! # Synchronization Model
//!
//! | Level | Primitive | Who waits |
//! |-------|-----------|-----------|
//! | Node → Node | Dependency semaphores | GPU |
//! | Graph → Graph | Injection semaphores | GPU |
//! | Unit reuse | Unit fence | CPU ([`Executor::execute`], [`Executor::wait_for`]) |
//!
//! CPU-side submission order only has to respect the dependency partial order;
//! the semaphores carry the actual GPU ordering. Two units may therefore be in
//! flight at the same time.
//!
//! # Example
//!
//! ```ignore
//! let device = DummyDevice::new();
//! let mut executor = Executor::new(ExecutorConfig::default(), &device);
//!
//! let lists = ensemble.grouped_entries();
//! executor.execute(&lists)?;
//! executor.wait_for()?;
//! ```

mod command;
mod queue;

pub use command::{Command, CommandList, CommandRecorder};
pub use queue::{SubmitQueue, Submission};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::device::Device;
use crate::error::{ExecError, ExecResult};
use crate::node::{ExecutionState, Node};
use crate::sync::Fence;

/// Default time to wait for an execution unit: effectively forever.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::MAX;

/// Configuration for an [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of execution units created by [`Executor::new`].
    pub unit_count: usize,
    /// Maximum time to wait for a unit to retire its previous work.
    pub wait_timeout: Duration,
    /// Pick an idle unit when one exists instead of strict round robin.
    pub prefer_idle_units: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            unit_count: 2,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            prefer_idle_units: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_unit_count(mut self, unit_count: usize) -> Self {
        self.unit_count = unit_count;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn with_prefer_idle_units(mut self, prefer_idle_units: bool) -> Self {
        self.prefer_idle_units = prefer_idle_units;
        self
    }
}

/// One command-recording target plus one submission queue handle.
#[derive(Debug)]
pub struct ExecUnit {
    label: String,
    recorder: Box<dyn CommandRecorder>,
    queue: Arc<dyn SubmitQueue>,
    /// Signaled when the last submission retired. Starts signaled.
    fence: Fence,
    submission_count: u64,
}

impl ExecUnit {
    /// Create a unit. `fence` should start signaled so the unit is usable.
    pub fn new(
        label: impl Into<String>,
        recorder: Box<dyn CommandRecorder>,
        queue: Arc<dyn SubmitQueue>,
        fence: Fence,
    ) -> Self {
        Self {
            label: label.into(),
            recorder,
            queue,
            fence,
            submission_count: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn recorder(&self) -> &dyn CommandRecorder {
        self.recorder.as_ref()
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Whether the previous submission has retired (non-blocking).
    pub fn is_idle(&self) -> bool {
        self.fence.is_signaled()
    }

    /// Total submissions made through this unit.
    pub fn submission_count(&self) -> u64 {
        self.submission_count
    }

    /// Record `node` and submit it.
    ///
    /// The caller must have waited for the unit to become idle.
    fn submit(&mut self, node: &Node) -> ExecResult<()> {
        self.fence.reset();
        node.set_execution_state(ExecutionState::Executing);

        self.recorder.begin(node.label());
        let recorded = node.execute(self.recorder.as_mut());
        self.recorder.end();

        if !recorded {
            self.fence.signal();
            node.reset_execution_state();
            return Err(ExecError::RecordingFailed(node.id()));
        }

        let wait = node
            .inputs()
            .iter()
            .map(|dep| (dep.semaphore().as_ref(), dep.stage()))
            .chain(
                node.input_injections()
                    .iter()
                    .map(|inj| (inj.semaphore().as_ref(), inj.stage())),
            )
            .collect();
        let signal = node
            .outputs()
            .iter()
            .map(|dep| dep.semaphore().as_ref())
            .chain(
                node.output_injections()
                    .iter()
                    .map(|inj| inj.semaphore().as_ref()),
            )
            .collect();

        let submission = Submission {
            label: node.label(),
            commands: self.recorder.commands(),
            wait,
            signal,
            fence: &self.fence,
        };

        if let Err(err) = self.queue.submit(submission) {
            self.fence.signal();
            node.reset_execution_state();
            return Err(err);
        }

        self.submission_count += 1;
        node.set_execution_state(ExecutionState::Ready);
        Ok(())
    }
}

/// Distributes sorted nodes over a pool of execution units.
///
/// # Thread Safety
///
/// `Executor` is owned by a single submission thread. The GPU work it
/// submits runs concurrently.
#[derive(Debug)]
pub struct Executor {
    config: ExecutorConfig,
    units: Vec<ExecUnit>,
    /// Next unit in round-robin order.
    next_unit: usize,
}

impl Executor {
    /// Create an executor with `config.unit_count` units from `device`.
    pub fn new(config: ExecutorConfig, device: &dyn Device) -> Self {
        let units = (0..config.unit_count)
            .map(|i| device.create_exec_unit(i))
            .collect();
        Self::with_units(config, units)
    }

    /// Create an executor over caller-provided units.
    pub fn with_units(config: ExecutorConfig, units: Vec<ExecUnit>) -> Self {
        log::debug!("Executor created with {} execution units", units.len());
        Self {
            config,
            units,
            next_unit: 0,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn units(&self) -> &[ExecUnit] {
        &self.units
    }

    /// Submit every node of every list, in order.
    ///
    /// Lists are expected to be topologically sorted (see
    /// [`Ensemble::grouped_entries`](crate::ensemble::Ensemble::grouped_entries)).
    /// All nodes are reset to [`ExecutionState::Pending`] first. Returns the
    /// number of submitted nodes.
    pub fn execute(&mut self, node_lists: &[Vec<&Node>]) -> ExecResult<usize> {
        if self.units.is_empty() {
            return Err(ExecError::NoExecUnits);
        }

        for node in node_lists.iter().flatten() {
            node.reset_execution_state();
        }

        let mut submitted = 0;
        for node in node_lists.iter().flatten() {
            let index = self.select_unit();
            self.wait_for_unit(index)?;

            log::trace!(
                "Submitting node {} '{}' on unit {}",
                node.id(),
                node.label(),
                self.units[index].label()
            );
            self.units[index].submit(node)?;
            submitted += 1;
        }

        log::debug!(
            "Executed {} nodes from {} lists",
            submitted,
            node_lists.len()
        );
        Ok(submitted)
    }

    /// Index of a unit whose previous work has retired, without blocking.
    ///
    /// The search starts at the next round-robin position so idle units are
    /// used evenly.
    pub fn find_free_exec_unit(&self) -> Option<usize> {
        let count = self.units.len();
        (0..count)
            .map(|offset| (self.next_unit + offset) % count)
            .find(|&index| self.units[index].is_idle())
    }

    /// Block until one unit retires its work.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn wait_for_unit(&self, index: usize) -> ExecResult<()> {
        let unit = &self.units[index];
        if unit.fence.wait_timeout(self.config.wait_timeout) {
            Ok(())
        } else {
            log::warn!(
                "Execution unit '{}' did not retire within {:?}",
                unit.label(),
                self.config.wait_timeout
            );
            Err(ExecError::Timeout {
                unit: index,
                timeout: self.config.wait_timeout,
            })
        }
    }

    /// Block until every unit retires its work.
    ///
    /// The timeout bounds the total wait across all units.
    pub fn wait_for(&self) -> ExecResult<()> {
        let timeout = self.config.wait_timeout;
        let start = Instant::now();

        for (index, unit) in self.units.iter().enumerate() {
            let remaining = timeout.saturating_sub(start.elapsed());
            if !unit.fence.wait_timeout(remaining) {
                log::warn!("Timed out waiting for execution unit '{}'", unit.label());
                return Err(ExecError::Timeout { unit: index, timeout });
            }
        }

        Ok(())
    }

    fn select_unit(&mut self) -> usize {
        let index = if self.config.prefer_idle_units {
            self.find_free_exec_unit().unwrap_or(self.next_unit)
        } else {
            self.next_unit
        };
        self.next_unit = (index + 1) % self.units.len();
        index
    }
}
