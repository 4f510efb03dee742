//! The capability surface every node kind provides.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::device::Device;
use crate::executor::{Command, CommandRecorder};

/// Work recorded by a node.
///
/// The scheduler only ever calls these three operations; it never needs the
/// concrete type. Collaborators downcast through [`as_any`](Self::as_any)
/// when wiring cross-cutting state from a connector callback.
pub trait Operation: Send + Sync + fmt::Debug {
    /// Record the node's commands. Returns `false` if nothing could be recorded.
    fn execute(&self, recorder: &mut dyn CommandRecorder) -> bool;

    /// Refresh resource bindings. Returns `false` if the bindings are unusable.
    fn update(&mut self) -> bool {
        true
    }

    /// Deep-copy the operation for an independent graph instance.
    fn clone_operation(&self, device: &dyn Device) -> Box<dyn Operation>;

    /// Allow downcasting.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Compute dispatch with named push constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOperation {
    kernel: String,
    workgroups: [u32; 3],
    constants: Vec<(String, f32)>,
    binding_generation: u64,
}

impl ComputeOperation {
    pub fn new(kernel: impl Into<String>, workgroups: [u32; 3]) -> Self {
        Self {
            kernel: kernel.into(),
            workgroups,
            constants: Vec::new(),
            binding_generation: 0,
        }
    }

    /// Name of the kernel this operation dispatches.
    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }

    /// Set (or overwrite) a push constant.
    pub fn set_constant(&mut self, name: impl Into<String>, value: f32) {
        let name = name.into();
        match self.constants.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.constants.push((name, value)),
        }
    }

    pub fn constant(&self, name: &str) -> Option<f32> {
        self.constants
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }

    /// How many times the bindings were refreshed.
    pub fn binding_generation(&self) -> u64 {
        self.binding_generation
    }
}

impl Operation for ComputeOperation {
    fn execute(&self, recorder: &mut dyn CommandRecorder) -> bool {
        if self.workgroups.contains(&0) {
            return false;
        }
        recorder.record(Command::Marker(self.kernel.clone()));
        for (name, value) in &self.constants {
            recorder.record(Command::PushConstant {
                name: name.clone(),
                value: *value,
            });
        }
        let [x, y, z] = self.workgroups;
        recorder.record(Command::Dispatch { x, y, z });
        true
    }

    fn update(&mut self) -> bool {
        self.binding_generation += 1;
        true
    }

    fn clone_operation(&self, _device: &dyn Device) -> Box<dyn Operation> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type RecordFn = dyn Fn(&mut dyn CommandRecorder) -> bool + Send + Sync;

/// Name-addressed operation whose work is an arbitrary recording closure.
///
/// Without a closure it only records a marker, which makes it usable as a
/// pass-through node (e.g. a synchronization join point).
#[derive(Clone)]
pub struct GenericOperation {
    name: String,
    record: Option<Arc<RecordFn>>,
}

impl GenericOperation {
    /// Pass-through operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record: None,
        }
    }

    /// Operation running `record` when executed.
    pub fn with_recorder(
        name: impl Into<String>,
        record: impl Fn(&mut dyn CommandRecorder) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            record: Some(Arc::new(record)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for GenericOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericOperation")
            .field("name", &self.name)
            .field("pass_through", &self.record.is_none())
            .finish()
    }
}

impl Operation for GenericOperation {
    fn execute(&self, recorder: &mut dyn CommandRecorder) -> bool {
        recorder.record(Command::Marker(self.name.clone()));
        match &self.record {
            Some(record) => record(recorder),
            None => true,
        }
    }

    fn clone_operation(&self, _device: &dyn Device) -> Box<dyn Operation> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DummyDevice;
    use crate::executor::CommandList;

    #[test]
    fn test_compute_records_constants_and_dispatch() {
        let mut op = ComputeOperation::new("bloom_down", [8, 8, 1]);
        op.set_constant("threshold", 0.8);
        op.set_constant("threshold", 0.9);

        let mut list = CommandList::new();
        assert!(op.execute(&mut list));
        assert_eq!(
            list.commands(),
            &[
                Command::Marker("bloom_down".into()),
                Command::PushConstant {
                    name: "threshold".into(),
                    value: 0.9
                },
                Command::Dispatch { x: 8, y: 8, z: 1 },
            ]
        );
    }

    #[test]
    fn test_compute_empty_dispatch_fails() {
        let op = ComputeOperation::new("noop", [0, 1, 1]);
        let mut list = CommandList::new();
        assert!(!op.execute(&mut list));
        assert!(list.commands().is_empty());
    }

    #[test]
    fn test_compute_update_bumps_generation() {
        let mut op = ComputeOperation::new("k", [1, 1, 1]);
        assert!(op.update());
        assert!(op.update());
        assert_eq!(op.binding_generation(), 2);
    }

    #[test]
    fn test_generic_pass_through() {
        let op = GenericOperation::new("join");
        let mut list = CommandList::new();
        assert!(op.execute(&mut list));
        assert_eq!(list.commands(), &[Command::Marker("join".into())]);
    }

    #[test]
    fn test_generic_with_recorder_and_clone() {
        let op = GenericOperation::with_recorder("draw", |recorder| {
            recorder.record(Command::Draw {
                vertices: 3,
                instances: 1,
            });
            true
        });

        let device = DummyDevice::new();
        let copy = op.clone_operation(&device);

        let mut list = CommandList::new();
        assert!(copy.execute(&mut list));
        assert_eq!(list.commands().len(), 2);
        assert_eq!(
            copy.as_any().downcast_ref::<GenericOperation>().unwrap().name(),
            "draw"
        );
    }
}
