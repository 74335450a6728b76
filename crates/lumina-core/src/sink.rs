//! Seams between the executor and its downstream collaborators.

use crate::command::{Command, CommandKind};
use crate::types::StatusPatch;

/// Delivery of device commands to the connected actuators.
///
/// Implementations must not block beyond a short per-target send timeout and
/// must treat zero connected actuators as a no-op.
pub trait CommandSink: Send + Sync {
    /// Fire-and-forget delivery to every connected actuator.
    fn broadcast(&self, command: &Command);

    /// Cache the most recent command of `kind` for replay to actuators that
    /// connect later.
    fn remember_last(&self, kind: CommandKind, command: &Command);

    /// Record then deliver, in that order.
    fn send(&self, command: &Command) {
        self.remember_last(command.kind(), command);
        self.broadcast(command);
    }
}

/// Replication of player status to observers.
pub trait StatusPublisher: Send + Sync {
    /// Merge `patch` into the last-known status and fan it out.
    fn publish(&self, patch: StatusPatch);
}
