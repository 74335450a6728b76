//! Recording doubles for the sink and publisher seams.

use lumina_core::{Command, CommandKind, CommandSink, StatusPatch, StatusPublisher};
use parking_lot::Mutex;

/// What happened on the sink, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Remember(CommandKind, Command),
    Broadcast(Command),
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Broadcast commands only.
    pub fn sent(&self) -> Vec<Command> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Broadcast(c) => Some(c.clone()),
                SinkEvent::Remember(..) => None,
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.sent().iter().map(Command::to_line).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl CommandSink for RecordingSink {
    fn broadcast(&self, command: &Command) {
        self.events.lock().push(SinkEvent::Broadcast(command.clone()));
    }

    fn remember_last(&self, kind: CommandKind, command: &Command) {
        self.events
            .lock()
            .push(SinkEvent::Remember(kind, command.clone()));
    }
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    patches: Mutex<Vec<StatusPatch>>,
}

impl RecordingPublisher {
    pub fn patches(&self) -> Vec<StatusPatch> {
        self.patches.lock().clone()
    }

    /// Patches that are more than an elapsed-time update.
    pub fn transitions(&self) -> Vec<StatusPatch> {
        self.patches
            .lock()
            .iter()
            .filter(|p| p.is_playing.is_some() || p.active_index.is_some())
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.patches.lock().clear();
    }
}

impl StatusPublisher for RecordingPublisher {
    fn publish(&self, patch: StatusPatch) {
        self.patches.lock().push(patch);
    }
}
