//! Command recording targets.

use std::fmt;

/// A recorded GPU command.
///
/// Backends translate these into their native command buffer calls.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Debug marker naming the work that follows.
    Marker(String),
    /// Push constant update.
    PushConstant { name: String, value: f32 },
    /// Compute dispatch.
    Dispatch { x: u32, y: u32, z: u32 },
    /// Non-indexed draw.
    Draw { vertices: u32, instances: u32 },
}

/// A command-recording target owned by one execution unit.
pub trait CommandRecorder: Send + fmt::Debug {
    /// Start recording a fresh command buffer, discarding the previous one.
    fn begin(&mut self, label: &str);

    /// Append a command.
    fn record(&mut self, command: Command);

    /// Finish recording.
    fn end(&mut self);

    /// Commands recorded since the last [`begin`](Self::begin).
    fn commands(&self) -> &[Command];
}

/// In-memory command buffer.
///
/// `begin` clears the buffer but keeps its allocation for the next node.
#[derive(Debug, Default)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
    recording: bool,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label passed to the last [`begin`](CommandRecorder::begin).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }
}

impl CommandRecorder for CommandList {
    fn begin(&mut self, label: &str) {
        self.label.clear();
        self.label.push_str(label);
        self.commands.clear();
        self.recording = true;
    }

    fn record(&mut self, command: Command) {
        self.commands.push(command);
    }

    fn end(&mut self) {
        self.recording = false;
    }

    fn commands(&self) -> &[Command] {
        &self.commands
    }
}
