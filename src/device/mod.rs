//! Device context consumed by the scheduler.
//!
//! The scheduler never talks to a GPU API directly. Everything it needs from
//! the backend goes through [`Device`]: minting synchronization primitives for
//! edges and creating execution units. The device is passed explicitly to the
//! graph builders and to [`Graph::clone_with`](crate::graph::Graph::clone_with),
//! so graphs can be built and tested without a live GPU through
//! [`DummyDevice`].

mod dummy;

pub use dummy::{DummyDevice, DummyQueue, SubmitRecord};

use std::fmt;

use crate::executor::ExecUnit;
use crate::sync::{Fence, SemaphoreRef};

/// Synchronization-primitive factory and execution-unit source.
pub trait Device: Send + Sync + fmt::Debug {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Mint a fresh semaphore. Called once per structural or injected edge.
    fn create_semaphore(&self) -> SemaphoreRef;

    /// Create a fence.
    fn create_fence(&self, signaled: bool) -> Fence;

    /// Create the `index`-th execution unit, idle.
    fn create_exec_unit(&self, index: usize) -> ExecUnit;
}
