//! GPU synchronization primitives.
//!
//! This module provides the synchronization types the scheduler wires between
//! nodes and between graphs:
//!
//! | Level | Primitive | Purpose |
//! |-------|-----------|---------|
//! | Node → Node | [`Semaphore`] on a [`Dependency`](crate::node::Dependency) | GPU-GPU ordering inside a graph |
//! | Graph → Graph | [`Semaphore`] on a [`DependencyInjection`](crate::node::DependencyInjection) | GPU-GPU ordering across graphs |
//! | Unit → CPU | [`Fence`] | Retirement of an execution unit's work |
//!
//! Semaphores are minted by a [`Device`](crate::device::Device), one per edge,
//! and are never shared between two logically independent graphs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};

bitflags! {
    /// Pipeline stage at which the consumer of a dependency waits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStage: u32 {
        /// Before any command is processed.
        const TOP_OF_PIPE = 1 << 0;
        /// Indirect command parameters are consumed.
        const DRAW_INDIRECT = 1 << 1;
        /// Vertex and index buffers are consumed.
        const VERTEX_INPUT = 1 << 2;
        /// Vertex shader execution.
        const VERTEX_SHADER = 1 << 3;
        /// Fragment shader execution.
        const FRAGMENT_SHADER = 1 << 4;
        /// Early depth/stencil tests.
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        /// Late depth/stencil tests.
        const LATE_FRAGMENT_TESTS = 1 << 6;
        /// Color attachment writes.
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        /// Compute shader execution.
        const COMPUTE_SHADER = 1 << 8;
        /// Copy and blit operations.
        const TRANSFER = 1 << 9;
        /// After all commands complete.
        const BOTTOM_OF_PIPE = 1 << 10;
        /// Every stage.
        const ALL_COMMANDS = 1 << 11;
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::ALL_COMMANDS
    }
}

/// GPU semaphore ordering two pieces of GPU work.
///
/// One submission signals the semaphore when it completes; another waits on it
/// before starting. Semaphores cannot be waited on from the CPU. The signal
/// counter exists so tests and debug tooling can observe which edges fired.
#[derive(Debug)]
pub struct Semaphore {
    /// Unique identifier for debugging.
    id: u64,
    signal_count: AtomicU64,
}

impl Semaphore {
    /// Create a new semaphore with the given ID.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            signal_count: AtomicU64::new(0),
        }
    }

    /// Get the semaphore's unique ID (for debugging).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Record that a submission signaled this semaphore.
    ///
    /// Real backends call this when the queue retires the signaling submission.
    pub fn signal(&self) {
        self.signal_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of times this semaphore has been signaled.
    pub fn signal_count(&self) -> u64 {
        self.signal_count.load(Ordering::Acquire)
    }
}

/// Shared handle to a semaphore.
///
/// Both endpoints of an edge hold the same handle.
pub type SemaphoreRef = Arc<Semaphore>;

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence has not yet been signaled.
    Unsignaled,
    /// The fence has been signaled (GPU work complete).
    Signaled,
}

#[derive(Debug, Default)]
struct FenceState {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

/// CPU-GPU synchronization primitive.
///
/// Each execution unit owns one fence; the queue signals it when the unit's
/// submission retires and the executor waits on it before reusing the unit.
/// Waiting blocks on a condition variable, it never spins.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct Fence {
    state: Arc<FenceState>,
}

impl Fence {
    /// Create a new fence in the unsignaled state.
    pub fn new_unsignaled() -> Self {
        Self::default()
    }

    /// Create a new fence in the signaled state.
    pub fn new_signaled() -> Self {
        let fence = Self::default();
        fence.signal();
        fence
    }

    /// Check the current status of the fence.
    pub fn status(&self) -> FenceStatus {
        if *self.state.signaled.lock() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    /// Check if the fence is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) {
        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            self.state.condvar.wait(&mut signaled);
        }
    }

    /// Wait for the fence with a timeout.
    ///
    /// Returns `true` if the fence was signaled, `false` if the timeout elapsed.
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };

        let mut signaled = self.state.signaled.lock();
        while !*signaled {
            if self
                .state
                .condvar
                .wait_until(&mut signaled, deadline)
                .timed_out()
            {
                return *signaled;
            }
        }
        true
    }

    /// Reset the fence to unsignaled state.
    ///
    /// Must only be called when no GPU work is pending on this fence.
    pub fn reset(&self) {
        *self.state.signaled.lock() = false;
    }

    /// Signal the fence and wake every waiter.
    pub fn signal(&self) {
        let mut signaled = self.state.signaled.lock();
        *signaled = true;
        self.state.condvar.notify_all();
    }
}
