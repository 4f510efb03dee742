//! Dummy device for testing and development.
//!
//! This device doesn't perform actual GPU operations. Its queue "retires" work
//! immediately on submission: it signals the submission's semaphores and fence
//! and keeps a log of what was submitted so tests can inspect it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ExecResult;
use crate::executor::{Command, CommandList, ExecUnit, SubmitQueue, Submission};
use crate::sync::{Fence, Semaphore, SemaphoreRef};

use super::Device;

/// What the dummy queue saw for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRecord {
    pub label: String,
    pub commands: Vec<Command>,
    /// IDs of the semaphores waited on.
    pub waits: Vec<u64>,
    /// IDs of the semaphores signaled.
    pub signals: Vec<u64>,
}

/// Queue that completes every submission instantly.
#[derive(Debug, Default)]
pub struct DummyQueue {
    records: Mutex<Vec<SubmitRecord>>,
}

impl DummyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every submission so far, in submission order.
    pub fn records(&self) -> Vec<SubmitRecord> {
        self.records.lock().clone()
    }

    /// Forget recorded submissions.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl SubmitQueue for DummyQueue {
    fn submit(&self, submission: Submission<'_>) -> ExecResult<()> {
        log::trace!(
            "DummyQueue: submit '{}' ({} commands, wait={}, signal={})",
            submission.label,
            submission.commands.len(),
            submission.wait.len(),
            submission.signal.len()
        );

        self.records.lock().push(SubmitRecord {
            label: submission.label.to_string(),
            commands: submission.commands.to_vec(),
            waits: submission.wait.iter().map(|(s, _)| s.id()).collect(),
            signals: submission.signal.iter().map(|s| s.id()).collect(),
        });

        for semaphore in &submission.signal {
            semaphore.signal();
        }
        submission.fence.signal();
        Ok(())
    }
}

/// Dummy device.
#[derive(Debug)]
pub struct DummyDevice {
    next_semaphore_id: AtomicU64,
    queue: Arc<DummyQueue>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self {
            next_semaphore_id: AtomicU64::new(0),
            queue: Arc::new(DummyQueue::new()),
        }
    }

    /// The queue shared by every execution unit of this device.
    pub fn queue(&self) -> Arc<DummyQueue> {
        Arc::clone(&self.queue)
    }

    /// Number of semaphores minted so far.
    pub fn semaphore_count(&self) -> u64 {
        self.next_semaphore_id.load(Ordering::Relaxed)
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for DummyDevice {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn create_semaphore(&self) -> SemaphoreRef {
        let id = self.next_semaphore_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(Semaphore::new(id))
    }

    fn create_fence(&self, signaled: bool) -> Fence {
        if signaled {
            Fence::new_signaled()
        } else {
            Fence::new_unsignaled()
        }
    }

    fn create_exec_unit(&self, index: usize) -> ExecUnit {
        ExecUnit::new(
            format!("dummy_unit_{index}"),
            Box::new(CommandList::new()),
            self.queue(),
            self.create_fence(true),
        )
    }
}
